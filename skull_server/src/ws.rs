use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use skull_core::{ClientMessage, PlayerId, ServerMessage, StateSnapshot};

use crate::error::ProtocolError;
use crate::registry::Room;
use crate::SharedState;

/// 连接当前关联的房间与玩家身份。一个连接同一时间至多属于
/// 一个房间；这是连接本地的状态，不属于 GameState。
type ConnContext = Option<(String, PlayerId)>;

/// 处理 WebSocket 连接请求
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接的上下文信息，加入房间后填充
    let mut context: ConnContext = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, state.clone(), &tx, &mut context).await;
                }
                Err(e) => {
                    // 格式错误的载荷在边界上就拦下，不会到达状态机
                    warn!("解析消息失败: {}", e);
                    let _ = tx
                        .send(ServerMessage::Error {
                            code: "MALFORMED_MESSAGE".to_string(),
                            message: "无法解析的消息".to_string(),
                        })
                        .await;
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((room_code, player_id)) = context {
        handle_disconnect(state, room_code, player_id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
pub(crate) async fn handle_client_message(
    msg: ClientMessage,
    state: SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut ConnContext,
) {
    match msg {
        ClientMessage::CreateRoom => {
            if context.is_some() {
                send_error(tx, &ProtocolError::AlreadyInRoom).await;
                return;
            }

            let (room_code, _room) = state.registry.create();
            info!("房间 {} 已创建", room_code);
            // 新房间还没有任何玩家，宽限期内无人加入则照常回收
            schedule_cleanup(state.clone(), room_code.clone());
            let _ = tx.send(ServerMessage::RoomCreated { room_code }).await;
        }
        ClientMessage::JoinRoom {
            room_code,
            player_name,
        } => {
            if context.is_some() {
                send_error(tx, &ProtocolError::AlreadyInRoom).await;
                return;
            }
            let Some(room) = state.registry.lookup(&room_code) else {
                send_error(tx, &ProtocolError::RoomNotFound).await;
                return;
            };

            let player_id = Uuid::new_v4();
            let join_result = {
                // conns 写锁 -> state 锁
                let mut conns = room.conns.write().await;
                let mut gs = room.state.lock();
                gs.join(player_id, player_name.clone()).map(|_| {
                    conns.insert(player_id, tx.clone());
                    gs.snapshot()
                })
            };

            match join_result {
                Err(e) => send_error(tx, &ProtocolError::Rejected(e)).await,
                Ok(snapshot) => {
                    info!("玩家 {} ({}) 加入了房间 {}", player_name, player_id, room_code);
                    *context = Some((room_code.clone(), player_id));
                    let _ = tx
                        .send(ServerMessage::RoomJoined {
                            room_code,
                            your_id: player_id,
                        })
                        .await;
                    broadcast_update(
                        &state,
                        &room,
                        ServerMessage::PlayerJoined {
                            player_id,
                            player_name,
                        },
                        snapshot,
                    )
                    .await;
                }
            }
        }
        // 其余消息都要求已在房间内
        action => {
            let Some((room_code, player_id)) = context.clone() else {
                send_error(tx, &ProtocolError::NotInRoom).await;
                return;
            };
            let Some(room) = state.registry.lookup(&room_code) else {
                send_error(tx, &ProtocolError::RoomNotFound).await;
                return;
            };

            // 对状态机的读-改-写整体在 state 锁内完成
            let outcome = {
                let mut gs = room.state.lock();
                let result: Result<ServerMessage, ProtocolError> = match &action {
                    ClientMessage::LeaveRoom => gs
                        .leave(player_id)
                        .map(|_| ServerMessage::PlayerLeft { player_id })
                        .map_err(Into::into),
                    ClientMessage::PlaceCard { kind } => gs
                        .place_card(player_id, *kind)
                        .map(|_| ServerMessage::CardPlaced {
                            player_id,
                            kind: Some(*kind),
                        })
                        .map_err(Into::into),
                    ClientMessage::MakeBid { amount } => gs
                        .bid(player_id, *amount)
                        .map(|_| ServerMessage::BidMade {
                            player_id,
                            amount: *amount,
                        })
                        .map_err(Into::into),
                    ClientMessage::Pass => gs
                        .pass(player_id)
                        .map(|_| ServerMessage::PlayerPassed { player_id })
                        .map_err(Into::into),
                    ClientMessage::FlipCard { target_player_id } => gs
                        .flip(player_id, *target_player_id)
                        .map(|revealed| ServerMessage::CardFlipped {
                            player_id,
                            target_player_id: *target_player_id,
                            revealed,
                        })
                        .map_err(Into::into),
                    ClientMessage::NextRound => gs
                        .next_round()
                        .map(|_| ServerMessage::RoundStarted { round: gs.round })
                        .map_err(Into::into),
                    // 连接已在房间内，重复建房/入房一律拒绝，不 panic
                    ClientMessage::CreateRoom | ClientMessage::JoinRoom { .. } => {
                        Err(ProtocolError::AlreadyInRoom)
                    }
                };
                result.map(|event| (event, gs.snapshot(), gs.players.is_empty()))
            };

            match outcome {
                // 拒绝只通知发起者，不广播
                Err(e) => send_error(tx, &e).await,
                Ok((event, snapshot, room_empty)) => {
                    if matches!(action, ClientMessage::LeaveRoom) {
                        // 先摘掉连接再广播：离开者不会收到自己的离场通知
                        room.conns.write().await.remove(&player_id);
                        *context = None;
                        info!("玩家 {} 离开了房间 {}", player_id, room_code);
                    }
                    broadcast_update(&state, &room, event, snapshot).await;
                    if room_empty {
                        // 状态机报告房间已空：立即移除，没有宽限期
                        state.registry.remove(&room_code);
                        info!("房间 {} 已空，已被移除", room_code);
                    }
                }
            }
        }
    }
}

/// 玩家断开连接后的处理
async fn handle_disconnect(state: SharedState, room_code: String, player_id: PlayerId) {
    info!("玩家 {} 从房间 {} 断开连接", player_id, room_code);
    let Some(room) = state.registry.lookup(&room_code) else {
        return;
    };

    let (snapshot, all_disconnected) = {
        // conns 写锁 -> state 锁
        let mut conns = room.conns.write().await;
        conns.remove(&player_id);

        let mut gs = room.state.lock();
        gs.set_connected(player_id, false);
        (gs.snapshot(), gs.all_disconnected())
    };

    broadcast_update(
        &state,
        &room,
        ServerMessage::PlayerDisconnected { player_id },
        snapshot,
    )
    .await;

    if all_disconnected {
        info!("房间 {} 内所有玩家都已掉线，安排回收", room_code);
        schedule_cleanup(state, room_code);
    }
}

/// 安排一次延迟回收
///
/// 定时器触发时必须重新检查所有人仍然掉线——等待期间可能有人
/// 重新加入，那样本次回收就作废。这个复查是必需的，不是优化。
pub(crate) fn schedule_cleanup(state: SharedState, room_code: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(state.config.grace).await;

        let Some(room) = state.registry.lookup(&room_code) else {
            return;
        };
        let still_all_disconnected = room.state.lock().all_disconnected();
        if still_all_disconnected {
            state.registry.remove(&room_code);
            info!("房间 {} 已被回收（全员掉线超过宽限期）", room_code);
        }
    })
}

/// 向房间内所有连接广播一条动作事件，紧跟一份状态快照
///
/// 参考行为是所有人收到同一份完整快照；开启脱敏后，事件和快照都
/// 按接收者逐个生成，隐藏他人面朝下的牌。
async fn broadcast_update(
    state: &SharedState,
    room: &Room,
    event: ServerMessage,
    snapshot: StateSnapshot,
) {
    let conns = room.conns.read().await;
    for (player_id, sender) in conns.iter() {
        let mut event = event.clone();
        if state.config.redact_snapshots {
            // 放牌事件里的牌面同样只有出牌人自己可见
            if let ServerMessage::CardPlaced { player_id: actor, kind } = &mut event {
                if *actor != *player_id {
                    *kind = None;
                }
            }
        }
        if sender.send(event).await.is_err() {
            // 发送失败，说明该玩家也断开了，后续由其自己的连接任务处理
            warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
            continue;
        }
        let snap = if state.config.redact_snapshots {
            snapshot.redacted_for(*player_id)
        } else {
            snapshot.clone()
        };
        let _ = sender.send(ServerMessage::Snapshot(snap)).await;
    }
}

async fn send_error(tx: &mpsc::Sender<ServerMessage>, err: &ProtocolError) {
    let _ = tx.send(err.notification()).await;
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::RoomRegistry;
    use crate::AppState;
    use skull_core::CardKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state(config: Config) -> SharedState {
        Arc::new(AppState {
            registry: RoomRegistry::new(),
            config,
        })
    }

    fn channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(64)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) {
        while rx.try_recv().is_ok() {}
    }

    /// 建房并让两名玩家入座，返回各自的通道和上下文
    async fn setup_two_player_room(
        state: &SharedState,
    ) -> (
        String,
        [(mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>, ConnContext); 2],
    ) {
        let (tx1, mut rx1) = channel();
        let (tx2, rx2) = channel();
        let mut ctx1: ConnContext = None;
        let mut ctx2: ConnContext = None;

        handle_client_message(ClientMessage::CreateRoom, state.clone(), &tx1, &mut ctx1).await;
        let code = match rx1.recv().await.unwrap() {
            ServerMessage::RoomCreated { room_code } => room_code,
            other => panic!("意外的消息: {:?}", other),
        };

        handle_client_message(
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: "Alice".to_string(),
            },
            state.clone(),
            &tx1,
            &mut ctx1,
        )
        .await;
        handle_client_message(
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: "Bob".to_string(),
            },
            state.clone(),
            &tx2,
            &mut ctx2,
        )
        .await;

        (code, [(tx1, rx1, ctx1), (tx2, rx2, ctx2)])
    }

    #[tokio::test]
    async fn test_create_and_join_flow() {
        let state = test_state(Config::default());
        let (tx, mut rx) = channel();
        let mut ctx: ConnContext = None;

        handle_client_message(ClientMessage::CreateRoom, state.clone(), &tx, &mut ctx).await;
        let code = match rx.recv().await.unwrap() {
            ServerMessage::RoomCreated { room_code } => room_code,
            other => panic!("意外的消息: {:?}", other),
        };
        assert!(state.registry.exists(&code));
        // 创建房间不等于入座
        assert!(ctx.is_none());

        handle_client_message(
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: "Alice".to_string(),
            },
            state.clone(),
            &tx,
            &mut ctx,
        )
        .await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::RoomJoined { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::PlayerJoined { .. }
        ));
        match rx.recv().await.unwrap() {
            ServerMessage::Snapshot(snap) => assert_eq!(snap.players.len(), 1),
            other => panic!("意外的消息: {:?}", other),
        }
        assert_eq!(ctx.as_ref().map(|(c, _)| c.as_str()), Some(code.as_str()));
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_rejected() {
        let state = test_state(Config::default());
        let (tx, mut rx) = channel();
        let mut ctx: ConnContext = None;

        handle_client_message(
            ClientMessage::JoinRoom {
                room_code: "ZZZZ".to_string(),
                player_name: "Alice".to_string(),
            },
            state.clone(),
            &tx,
            &mut ctx,
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, "ROOM_NOT_FOUND"),
            other => panic!("意外的消息: {:?}", other),
        }
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn test_action_without_room_is_rejected() {
        let state = test_state(Config::default());
        let (tx, mut rx) = channel();
        let mut ctx: ConnContext = None;

        handle_client_message(ClientMessage::Pass, state.clone(), &tx, &mut ctx).await;
        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, "NOT_IN_ROOM"),
            other => panic!("意外的消息: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_room_while_seated_is_rejected() {
        let state = test_state(Config::default());
        let (_code, [p1, _p2]) = setup_two_player_room(&state).await;
        let (tx1, mut rx1, mut ctx1) = p1;
        drain(&mut rx1);

        handle_client_message(ClientMessage::CreateRoom, state.clone(), &tx1, &mut ctx1).await;
        match rx1.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, "ALREADY_IN_ROOM"),
            other => panic!("意外的消息: {:?}", other),
        }
        // 原来的入座身份不受影响
        assert!(ctx1.is_some());
    }

    #[tokio::test]
    async fn test_rejection_goes_only_to_origin() {
        let state = test_state(Config::default());
        let (_code, [p1, p2]) = setup_two_player_room(&state).await;
        let (_tx1, mut rx1, _ctx1) = p1;
        let (tx2, mut rx2, mut ctx2) = p2;
        drain(&mut rx1);
        drain(&mut rx2);

        // Bob 不是当前行动者，出牌被拒
        handle_client_message(
            ClientMessage::PlaceCard {
                kind: CardKind::Rose,
            },
            state.clone(),
            &tx2,
            &mut ctx2,
        )
        .await;

        match rx2.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_TURN"),
            other => panic!("意外的消息: {:?}", other),
        }
        // 拒绝不广播
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_action_broadcasts_event_and_snapshot() {
        let state = test_state(Config::default());
        let (_code, [p1, p2]) = setup_two_player_room(&state).await;
        let (tx1, mut rx1, mut ctx1) = p1;
        let (_tx2, mut rx2, _ctx2) = p2;
        drain(&mut rx1);
        drain(&mut rx2);

        handle_client_message(
            ClientMessage::PlaceCard {
                kind: CardKind::Rose,
            },
            state.clone(),
            &tx1,
            &mut ctx1,
        )
        .await;

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                ServerMessage::CardPlaced {
                    kind: Some(CardKind::Rose),
                    ..
                }
            ));
            match rx.recv().await.unwrap() {
                ServerMessage::Snapshot(snap) => {
                    assert_eq!(snap.players[0].stack.len(), 1);
                }
                other => panic!("意外的消息: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_redacted_snapshots_hide_others_cards() {
        let mut config = Config::default();
        config.redact_snapshots = true;
        let state = test_state(config);

        let (_code, [p1, p2]) = setup_two_player_room(&state).await;
        let (tx1, mut rx1, mut ctx1) = p1;
        let (_tx2, mut rx2, _ctx2) = p2;
        drain(&mut rx1);
        drain(&mut rx2);

        handle_client_message(
            ClientMessage::PlaceCard {
                kind: CardKind::Rose,
            },
            state.clone(),
            &tx1,
            &mut ctx1,
        )
        .await;

        // 出牌人自己能看到牌的种类
        assert!(matches!(
            rx1.recv().await.unwrap(),
            ServerMessage::CardPlaced {
                kind: Some(CardKind::Rose),
                ..
            }
        ));
        // Bob 收到的出牌事件和快照里，Alice 面朝下的牌都被隐藏
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ServerMessage::CardPlaced { kind: None, .. }
        ));
        match rx2.recv().await.unwrap() {
            ServerMessage::Snapshot(snap) => {
                assert_eq!(snap.players[0].stack[0].kind, None);
            }
            other => panic!("意外的消息: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_removes_empty_room_immediately() {
        let state = test_state(Config::default());
        let (code, [p1, p2]) = setup_two_player_room(&state).await;
        let (tx1, mut rx1, mut ctx1) = p1;
        let (tx2, mut rx2, mut ctx2) = p2;
        drain(&mut rx1);
        drain(&mut rx2);

        handle_client_message(ClientMessage::LeaveRoom, state.clone(), &tx1, &mut ctx1).await;
        assert!(ctx1.is_none());
        // 离开者收不到自己的离场广播，留下的人收得到
        assert!(rx1.try_recv().is_err());
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ServerMessage::PlayerLeft { .. }
        ));
        assert!(state.registry.exists(&code));

        handle_client_message(ClientMessage::LeaveRoom, state.clone(), &tx2, &mut ctx2).await;
        // 最后一人离开后房间立即移除
        assert!(!state.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_room_after_grace() {
        let mut config = Config::default();
        config.grace = Duration::from_secs(60);
        let state = test_state(config);

        let (code, room) = state.registry.create();
        let player_id = Uuid::new_v4();
        {
            let mut gs = room.state.lock();
            gs.join(player_id, "Alice").unwrap();
            gs.set_connected(player_id, false);
        }

        let handle = schedule_cleanup(state.clone(), code.clone());
        handle.await.unwrap();
        assert!(!state.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_recheck_spares_room_on_reconnect() {
        let state = test_state(Config::default());

        let (code, room) = state.registry.create();
        let player_id = Uuid::new_v4();
        {
            let mut gs = room.state.lock();
            gs.join(player_id, "Alice").unwrap();
            gs.set_connected(player_id, false);
        }

        let handle = schedule_cleanup(state.clone(), code.clone());
        // 宽限期内有人回来了：到期复查后本次回收作废
        room.state.lock().set_connected(player_id, true);
        handle.await.unwrap();
        assert!(state.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unjoined_room_collected_after_grace() {
        let state = test_state(Config::default());
        let (tx, mut rx) = channel();
        let mut ctx: ConnContext = None;

        handle_client_message(ClientMessage::CreateRoom, state.clone(), &tx, &mut ctx).await;
        let code = match rx.recv().await.unwrap() {
            ServerMessage::RoomCreated { room_code } => room_code,
            other => panic!("意外的消息: {:?}", other),
        };
        assert!(state.registry.exists(&code));

        // 建好后一直没有人入座，宽限期后房间被回收
        tokio::time::sleep(state.config.grace + Duration::from_secs(1)).await;
        assert!(!state.registry.exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unjoined_room_spared_after_first_join() {
        let state = test_state(Config::default());
        let (tx, mut rx) = channel();
        let mut ctx: ConnContext = None;

        handle_client_message(ClientMessage::CreateRoom, state.clone(), &tx, &mut ctx).await;
        let code = match rx.recv().await.unwrap() {
            ServerMessage::RoomCreated { room_code } => room_code,
            other => panic!("意外的消息: {:?}", other),
        };

        handle_client_message(
            ClientMessage::JoinRoom {
                room_code: code.clone(),
                player_name: "Alice".to_string(),
            },
            state.clone(),
            &tx,
            &mut ctx,
        )
        .await;

        // 到期复查时房间里已经有在线玩家，本次回收作废
        tokio::time::sleep(state.config.grace + Duration::from_secs(1)).await;
        assert!(state.registry.exists(&code));
    }
}
