use crate::card::CardKind;
use crate::snapshot::StateSnapshot;
use crate::state::PlayerId;
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 这是一个封闭的标签联合：未知或格式错误的载荷在反序列化时
// 就会被拒绝，根本不会到达游戏状态机。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 客户端请求创建一个新房间（创建后需要再发 JoinRoom 入座）
    CreateRoom,
    /// 客户端请求加入一个已存在的房间
    JoinRoom {
        room_code: String,
        player_name: String,
    },
    /// 离开当前房间
    LeaveRoom,

    // --- 游戏内消息 ---
    /// 在自己的牌堆上放置一张牌
    PlaceCard { kind: CardKind },
    /// 叫牌
    MakeBid { amount: u32 },
    /// 放弃叫牌
    Pass,
    /// 翻开目标玩家牌堆顶部仍面朝下的一张牌
    FlipCard { target_player_id: PlayerId },
    /// 结算后开启下一轮
    NextRound,
}

// --- 服务器 -> 客户端 的消息 ---
// 每个被接受的变更都会广播一条动作事件，紧跟一份完整状态快照。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    // --- 房间管理消息 ---
    /// 房间创建成功，私密地回给发起者
    RoomCreated { room_code: String },
    /// 成功加入房间后，私密地回给该玩家
    RoomJoined {
        room_code: String,
        your_id: PlayerId,
    },

    // --- 房间内广播的事件 ---
    /// 一个新玩家加入了房间
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
    },
    /// 一个玩家离开了房间
    PlayerLeft { player_id: PlayerId },
    /// 一个玩家掉线了（宽限期内可能回来）
    PlayerDisconnected { player_id: PlayerId },
    /// 有玩家放置了一张牌。开启脱敏后，牌的种类只回显给出牌人
    /// 自己，其他人收到的这里是 None。
    CardPlaced {
        player_id: PlayerId,
        kind: Option<CardKind>,
    },
    /// 有玩家叫牌
    BidMade { player_id: PlayerId, amount: u32 },
    /// 有玩家放弃叫牌
    PlayerPassed { player_id: PlayerId },
    /// 翻牌结果，包含被翻开的牌的种类
    CardFlipped {
        player_id: PlayerId,
        target_player_id: PlayerId,
        revealed: CardKind,
    },
    /// 新的一轮开始
    RoundStarted { round: u32 },

    /// 完整游戏状态的快照
    Snapshot(StateSnapshot),

    /// 错误通知，只发给引发错误的那个连接
    Error { code: String, message: String },
}

// --- 单元测试 ---
