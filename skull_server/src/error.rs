use skull_core::{ActionError, ServerMessage};
use thiserror::Error;

/// 协议边界上的故障
///
/// 与游戏规则层面的预期拒绝 (`ActionError`) 分成两层：这一层处理
/// 的是连接状态本身的问题（不在房间里、房间码失效等）。两类错误
/// 最终都转换成 `Error` 通知，只发回给出错的那个连接，绝不影响
/// 其他房间的状态和连接。
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("房间不存在")]
    RoomNotFound,
    #[error("你已经在一个房间里了")]
    AlreadyInRoom,
    #[error("请先加入或创建一个房间")]
    NotInRoom,
    #[error(transparent)]
    Rejected(#[from] ActionError),
}

impl ProtocolError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::RoomNotFound => "ROOM_NOT_FOUND",
            ProtocolError::AlreadyInRoom => "ALREADY_IN_ROOM",
            ProtocolError::NotInRoom => "NOT_IN_ROOM",
            ProtocolError::Rejected(e) => e.code(),
        }
    }

    /// 转换成发给客户端的错误通知
    pub fn notification(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

// --- 单元测试 ---
