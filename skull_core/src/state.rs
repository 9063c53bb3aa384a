use crate::card::Card;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// 房间最多容纳的玩家数量
pub const MAX_PLAYERS: usize = 6;
/// 每名玩家开局时的手牌数量 (3 朵玫瑰 + 1 个骷髅)
pub const STARTING_HAND_SIZE: u32 = 4;
/// 达到该分数的玩家获胜
pub const WINNING_SCORE: u32 = 2;

/// 单个房间的完整游戏状态
///
/// 由游戏状态机独占持有，所有修改都必须经过 `logic` 模块里的
/// 操作方法；协议层只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub players: HashMap<PlayerId, Player>, // 可以根据player id查找player
    // 回合顺序，即玩家的加入顺序。在房间的生命周期内是固定的
    // 环：移除玩家只会从中删除对应的键，不会改变其余玩家的相对顺序。
    pub turn_order: Vec<PlayerId>,

    pub phase: GamePhase,
    pub current_player_id: Option<PlayerId>,
    // 当前叫牌数。在一次叫牌子回合内单调不减，只在进入下一轮时归零。
    pub current_bid: u32,
    // current_bid 为 0 时必然为 None，反之必然为 Some。
    pub highest_bidder_id: Option<PlayerId>,
    // 本次叫牌竞争中已成功翻开的牌数
    pub cards_flipped: u32,
    pub round: u32,
    // 某玩家达到 WINNING_SCORE 时记录在这里；没有独立的终局阶段，
    // 桌上的人可以选择继续开下一轮。
    pub winner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    // 剩余手牌数，开局为 4，只会减少（翻到骷髅的出牌人丢一张）
    pub hand_size: u32,
    // 本轮已放置的牌堆，最早放置的在最前面
    pub stack: Vec<Card>,
    // 得分单调不减，从不清零
    pub score: u32,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Placement,
    Bidding,
    Flipping,
    Result,
}

impl Default for GameState {
    fn default() -> Self {
        GameState {
            players: HashMap::new(),
            turn_order: Vec::new(),
            phase: GamePhase::Waiting,
            current_player_id: None,
            current_bid: 0,
            highest_bidder_id: None,
            cards_flipped: 0,
            round: 1,
            winner_id: None,
        }
    }
}

// --- GameState 的实现方法 ---

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 场上所有玩家已放置的牌的总数，即叫牌数的上限
    pub fn total_staked_cards(&self) -> u32 {
        self.players.values().map(|p| p.stack.len() as u32).sum()
    }

    /// 是否没有任何在线玩家（用于判断房间能否被回收）。
    /// 建好后无人加入的空房间也算在内。
    pub fn all_disconnected(&self) -> bool {
        self.players.values().all(|p| !p.connected)
    }
}
