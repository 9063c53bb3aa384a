use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, RwLock};

use skull_core::{GameState, PlayerId, ServerMessage};

/// 生成房间码的字母表，去掉了容易混淆的字符 (0/O、1/I 等)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// 房间码长度
pub const CODE_LEN: usize = 4;

/// 单个房间
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// conns -> state
pub struct Room {
    /// 房间的游戏状态。对它的每一次读-改-写都必须整体在这把锁内
    /// 完成，同一房间的两个动作绝不交错。
    pub state: Mutex<GameState>,
    /// 将 PlayerId 映射到该玩家 WebSocket 任务的发送通道
    pub conns: RwLock<HashMap<PlayerId, mpsc::Sender<ServerMessage>>>,
}

impl Room {
    fn new() -> Room {
        Room {
            state: Mutex::new(GameState::new()),
            conns: RwLock::new(HashMap::new()),
        }
    }
}

/// 房间注册表：房间码 -> 游戏状态，1:1，生命周期内唯一归属
///
/// 注册表本身不含任何游戏规则，只负责分配房间码和增删查。
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
        }
    }

    /// 创建一个新房间，返回分配到的房间码
    ///
    /// 碰撞概率很低，但必须实际检查而不能假设：通过 entry 原子地
    /// 占用房间码，已被占用时重新生成。房间关闭后其房间码可以被
    /// 再次分配。
    pub fn create(&self) -> (String, Arc<Room>) {
        loop {
            let code = random_code();
            match self.rooms.entry(code.clone()) {
                Entry::Vacant(entry) => {
                    let room = Arc::new(Room::new());
                    entry.insert(room.clone());
                    return (code, room);
                }
                Entry::Occupied(_) => continue,
            }
        }
    }

    pub fn lookup(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.get(code).map(|r| r.clone())
    }

    pub fn exists(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn remove(&self, code: &str) {
        self.rooms.remove(code);
    }

    /// 当前所有活跃房间的房间码
    pub fn codes(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

// --- 单元测试 ---
