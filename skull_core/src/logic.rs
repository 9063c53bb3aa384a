use crate::card::{Card, CardKind};
use crate::state::*;
use thiserror::Error;

/// 游戏规则层面的预期拒绝
///
/// 这些都是正常游戏流程中会出现的失败（不该你行动、阶段不对、
/// 叫牌不合法等），调用方必须检查并分支处理，状态机本身从不 panic。
/// 被拒绝的操作保证不改变任何状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("房间已满")]
    RoomFull,
    #[error("玩家不存在")]
    PlayerNotFound,
    #[error("还没轮到你行动")]
    NotYourTurn,
    #[error("当前阶段不能执行这个操作")]
    WrongPhase,
    #[error("叫牌必须高于当前叫牌数")]
    BidTooLow,
    #[error("叫牌不能超过场上已放置的牌数")]
    BidTooHigh,
    #[error("只有最高叫牌者才能翻牌")]
    NotHighestBidder,
    #[error("目标没有可以翻开的牌")]
    NothingToFlip,
}

impl ActionError {
    /// 稳定的机器可读错误码，协议层原样下发给客户端
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::RoomFull => "ROOM_FULL",
            ActionError::PlayerNotFound => "PLAYER_NOT_FOUND",
            ActionError::NotYourTurn => "INVALID_TURN",
            ActionError::WrongPhase => "INVALID_GAME_PHASE",
            ActionError::BidTooLow | ActionError::BidTooHigh => "INVALID_BID",
            ActionError::NotHighestBidder | ActionError::NothingToFlip => "INVALID_ACTION",
        }
    }
}

// --- 核心游戏流程 ---

impl GameState {
    /// 玩家加入房间
    ///
    /// 第一个加入的玩家成为当前行动者；第二名玩家在等待阶段加入时
    /// 触发一次（且仅一次）Waiting -> Placement 的转换。
    pub fn join(&mut self, id: PlayerId, name: impl Into<String>) -> Result<(), ActionError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(ActionError::RoomFull);
        }

        self.players.insert(
            id,
            Player {
                id,
                name: name.into(),
                hand_size: STARTING_HAND_SIZE,
                stack: Vec::new(),
                score: 0,
                connected: true,
            },
        );
        self.turn_order.push(id);

        if self.players.len() == 1 {
            self.current_player_id = Some(id);
        }
        if self.players.len() >= 2 && self.phase == GamePhase::Waiting {
            self.phase = GamePhase::Placement;
        }

        Ok(())
    }

    /// 玩家离开房间
    pub fn leave(&mut self, id: PlayerId) -> Result<(), ActionError> {
        if !self.players.contains_key(&id) {
            return Err(ActionError::PlayerNotFound);
        }
        self.remove_player(id);
        Ok(())
    }

    /// 标记玩家的连接状态，不产生任何其他状态影响
    /// （断线后的房间回收由协议层负责）
    pub fn set_connected(&mut self, id: PlayerId, connected: bool) {
        if let Some(player) = self.players.get_mut(&id) {
            player.connected = connected;
        }
    }

    /// 在自己的牌堆上放置一张面朝下的牌
    ///
    /// 所有在场玩家都至少放置了一张牌时进入叫牌阶段——这是唯一的
    /// 触发条件。中途加入的玩家还没放牌时，其余玩家可以继续在
    /// 自己的牌堆上叠加，数量没有上限。
    pub fn place_card(&mut self, player_id: PlayerId, kind: CardKind) -> Result<(), ActionError> {
        if self.current_player_id != Some(player_id) {
            return Err(ActionError::NotYourTurn);
        }
        if self.phase != GamePhase::Placement {
            return Err(ActionError::WrongPhase);
        }

        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(ActionError::PlayerNotFound)?;
        player.stack.push(Card::face_down(kind));

        self.advance_turn();

        if self.players.values().all(|p| !p.stack.is_empty()) {
            self.phase = GamePhase::Bidding;
        }

        Ok(())
    }

    /// 叫牌：宣称自己能连续翻开 `amount` 张牌而不碰到骷髅
    ///
    /// 必须严格高于当前叫牌数，且不能超过场上已放置的牌的总数。
    pub fn bid(&mut self, player_id: PlayerId, amount: u32) -> Result<(), ActionError> {
        if self.current_player_id != Some(player_id) {
            return Err(ActionError::NotYourTurn);
        }
        if self.phase != GamePhase::Bidding {
            return Err(ActionError::WrongPhase);
        }
        if amount <= self.current_bid {
            return Err(ActionError::BidTooLow);
        }
        if amount > self.total_staked_cards() {
            return Err(ActionError::BidTooHigh);
        }

        self.current_bid = amount;
        self.highest_bidder_id = Some(player_id);
        self.advance_turn();

        Ok(())
    }

    /// 放弃叫牌
    ///
    /// 回合绕回到最高叫牌者时，叫牌结束，进入翻牌阶段。
    pub fn pass(&mut self, player_id: PlayerId) -> Result<(), ActionError> {
        if self.current_player_id != Some(player_id) {
            return Err(ActionError::NotYourTurn);
        }
        if self.phase != GamePhase::Bidding {
            return Err(ActionError::WrongPhase);
        }

        self.advance_turn();

        if self.highest_bidder_id.is_some() && self.current_player_id == self.highest_bidder_id {
            self.phase = GamePhase::Flipping;
            self.cards_flipped = 0;
        }

        Ok(())
    }

    /// 最高叫牌者翻开目标玩家牌堆中最早放置的、仍面朝下的一张牌
    ///
    /// - 翻到骷髅：本次挑战失败，进入结算阶段，出牌人损失一张手牌；
    ///   手牌耗尽的玩家被整体移出房间，效果等同于主动离开。
    /// - 翻到玫瑰且翻牌数达到叫牌数：挑战成功，进入结算阶段，得一分。
    /// - 否则停留在翻牌阶段，由叫牌者继续选择下一个目标（没有自动
    ///   的回合推进）。
    pub fn flip(
        &mut self,
        acting_player_id: PlayerId,
        target_player_id: PlayerId,
    ) -> Result<CardKind, ActionError> {
        if self.current_player_id != Some(acting_player_id) {
            return Err(ActionError::NotYourTurn);
        }
        if self.phase != GamePhase::Flipping {
            return Err(ActionError::WrongPhase);
        }
        if self.highest_bidder_id != Some(acting_player_id) {
            return Err(ActionError::NotHighestBidder);
        }

        let target = self
            .players
            .get_mut(&target_player_id)
            .ok_or(ActionError::PlayerNotFound)?;
        let card = target
            .stack
            .iter_mut()
            .find(|c| !c.face_up)
            .ok_or(ActionError::NothingToFlip)?;

        let revealed = card.flip();
        self.cards_flipped += 1;

        match revealed {
            CardKind::Skull => {
                self.phase = GamePhase::Result;
                let eliminated = match self.players.get_mut(&acting_player_id) {
                    Some(player) => {
                        player.hand_size = player.hand_size.saturating_sub(1);
                        player.hand_size == 0
                    }
                    None => false,
                };
                if eliminated {
                    self.remove_player(acting_player_id);
                }
            }
            CardKind::Rose => {
                if self.cards_flipped >= self.current_bid {
                    self.phase = GamePhase::Result;
                    if let Some(player) = self.players.get_mut(&acting_player_id) {
                        player.score += 1;
                        if player.score >= WINNING_SCORE {
                            self.winner_id = Some(acting_player_id);
                        }
                    }
                }
            }
        }

        Ok(revealed)
    }

    /// 结算之后开启新的一轮
    ///
    /// 清空所有人的牌堆、归零叫牌状态，首先行动的玩家从上一轮结束
    /// 时的值往后推一位。
    pub fn next_round(&mut self) -> Result<(), ActionError> {
        if self.phase != GamePhase::Result {
            return Err(ActionError::WrongPhase);
        }

        self.current_bid = 0;
        self.highest_bidder_id = None;
        self.cards_flipped = 0;
        self.winner_id = None;
        self.round += 1;

        for player in self.players.values_mut() {
            player.stack.clear();
        }

        if self.current_player_id.is_some() {
            self.advance_turn();
        } else {
            self.current_player_id = self.turn_order.first().copied();
        }

        self.phase = GamePhase::Placement;
        Ok(())
    }

    // --- 辅助逻辑 ---

    /// 沿加入顺序把行动权移交给下一名在场玩家
    fn advance_turn(&mut self) {
        let Some(current) = self.current_player_id else {
            return;
        };
        let Some(pos) = self.turn_order.iter().position(|id| *id == current) else {
            return;
        };

        let n = self.turn_order.len();
        for step in 1..=n {
            let candidate = self.turn_order[(pos + step) % n];
            if self.players.contains_key(&candidate) {
                self.current_player_id = Some(candidate);
                return;
            }
        }
    }

    /// 移除一名玩家：先在移除前的环上推进回合，再清理叫牌状态。
    /// 翻牌人离场会让本次挑战直接结算；其他人离场时叫数收缩到
    /// 场上剩余的总牌数，收缩后已达成的挑战同样立即结算。
    /// 玩家不足 2 人时退回等待阶段并把轮数重置为 1。
    fn remove_player(&mut self, id: PlayerId) {
        if self.current_player_id == Some(id) {
            self.advance_turn();
        }

        self.players.remove(&id);
        self.turn_order.retain(|p| *p != id);

        if self.current_player_id == Some(id) {
            // 离开的是场上最后一名（或唯一一名）玩家
            self.current_player_id = self.turn_order.first().copied();
        }

        if self.highest_bidder_id == Some(id) {
            // 最高叫牌者离场，本次叫牌子回合作废
            self.highest_bidder_id = None;
            self.current_bid = 0;
        }

        if self.players.len() < 2 {
            // 人数不足，对局回到等待阶段，不保留任何轮内状态
            self.phase = GamePhase::Waiting;
            self.round = 1;
            self.current_bid = 0;
            self.highest_bidder_id = None;
            self.cards_flipped = 0;
            self.winner_id = None;
            for player in self.players.values_mut() {
                player.stack.clear();
            }
            return;
        }

        // 离开者的牌堆随之消失，叫数不能超过场上剩余的总牌数
        let staked = self.total_staked_cards();
        if self.current_bid > staked {
            self.current_bid = staked;
        }

        if self.phase == GamePhase::Flipping {
            match self.highest_bidder_id {
                // 翻牌人自己离场，本次挑战作废，直接进入结算
                None => self.phase = GamePhase::Result,
                // 叫数收缩后挑战可能已经达成，按翻玫瑰成功处理
                Some(bidder_id) if self.cards_flipped >= self.current_bid => {
                    self.phase = GamePhase::Result;
                    if let Some(bidder) = self.players.get_mut(&bidder_id) {
                        bidder.score += 1;
                        if bidder.score >= WINNING_SCORE {
                            self.winner_id = Some(bidder_id);
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}

// --- 单元测试 ---
