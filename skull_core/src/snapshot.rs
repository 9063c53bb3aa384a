use crate::card::{Card, CardKind};
use crate::state::{GamePhase, GameState, Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 快照中的一张牌
///
/// 服务端广播的参考行为会带上每张牌的真实种类（包括面朝下的牌，
/// 这是为了与原始协议兼容而保留的隐私缺口）；脱敏后的快照里，
/// 他人面朝下的牌 `kind` 为 None。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub kind: Option<CardKind>,
    pub face_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub hand_size: u32,
    pub stack: Vec<CardView>,
    pub score: u32,
    pub connected: bool,
}

/// 一个房间完整物化后的状态快照
///
/// 每次被接受的变更之后整体广播给房间内的所有连接。玩家列表
/// 按加入顺序排列，该顺序与回合顺序一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub phase: GamePhase,
    pub current_player_id: Option<PlayerId>,
    pub current_bid: u32,
    pub highest_bidder_id: Option<PlayerId>,
    pub cards_flipped: u32,
    pub round: u32,
    pub winner_id: Option<PlayerId>,
}

impl GameState {
    /// 生成当前状态的完整快照
    pub fn snapshot(&self) -> StateSnapshot {
        let players = self
            .turn_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                hand_size: p.hand_size,
                stack: p
                    .stack
                    .iter()
                    .map(|c| CardView {
                        kind: Some(c.kind),
                        face_up: c.face_up,
                    })
                    .collect(),
                score: p.score,
                connected: p.connected,
            })
            .collect();

        StateSnapshot {
            players,
            phase: self.phase,
            current_player_id: self.current_player_id,
            current_bid: self.current_bid,
            highest_bidder_id: self.highest_bidder_id,
            cards_flipped: self.cards_flipped,
            round: self.round,
            winner_id: self.winner_id,
        }
    }

    /// 从完整快照重建游戏状态，玩家顺序原样保留
    ///
    /// 只有未脱敏的快照才能重建；任何一张牌缺少种类时返回 None。
    pub fn from_snapshot(snap: &StateSnapshot) -> Option<GameState> {
        let mut players = HashMap::new();
        let mut turn_order = Vec::with_capacity(snap.players.len());

        for p in &snap.players {
            let mut stack = Vec::with_capacity(p.stack.len());
            for view in &p.stack {
                stack.push(Card {
                    kind: view.kind?,
                    face_up: view.face_up,
                });
            }
            players.insert(
                p.id,
                Player {
                    id: p.id,
                    name: p.name.clone(),
                    hand_size: p.hand_size,
                    stack,
                    score: p.score,
                    connected: p.connected,
                },
            );
            turn_order.push(p.id);
        }

        Some(GameState {
            players,
            turn_order,
            phase: snap.phase,
            current_player_id: snap.current_player_id,
            current_bid: snap.current_bid,
            highest_bidder_id: snap.highest_bidder_id,
            cards_flipped: snap.cards_flipped,
            round: snap.round,
            winner_id: snap.winner_id,
        })
    }
}

impl StateSnapshot {
    /// 为指定客户端脱敏：隐藏其他玩家面朝下的牌的种类。
    /// 自己的牌和所有已翻开的牌保持可见。
    pub fn redacted_for(&self, viewer: PlayerId) -> StateSnapshot {
        let mut snap = self.clone();
        for player in &mut snap.players {
            if player.id == viewer {
                continue;
            }
            for card in &mut player.stack {
                if !card.face_up {
                    card.kind = None;
                }
            }
        }
        snap
    }
}

// --- 单元测试 ---
