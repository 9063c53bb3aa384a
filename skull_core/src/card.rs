use serde::{Deserialize, Serialize};
use std::fmt;

// --- 核心数据结构定义 ---

/// 牌面种类 (CardKind)
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Rose,  // 玫瑰 🌹
    Skull, // 骷髅 💀
}

/// 单张牌 (Card)
///
/// 牌在放置时总是面朝下；`face_up` 只会从 false 翻到 true 一次，
/// 永远不会翻回去（下一轮开始时整个牌堆被清空重建）。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub kind: CardKind,
    pub face_up: bool,
}

impl Card {
    /// 创建一张面朝下的牌
    pub fn face_down(kind: CardKind) -> Card {
        Card {
            kind,
            face_up: false,
        }
    }

    /// 翻开这张牌，返回其种类
    pub fn flip(&mut self) -> CardKind {
        self.face_up = true;
        self.kind
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CardKind::Rose => "🌹",
                CardKind::Skull => "💀",
            }
        )
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // 面朝下的牌对外只显示牌背
        if self.face_up {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "🂠")
        }
    }
}

// --- 单元测试 ---
