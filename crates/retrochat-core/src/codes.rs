use rand::Rng;
use retrochat_types::models::RoomCode;

/// Where candidate room codes come from. Candidates may collide with live
/// rooms; the store decides.
pub trait CodeSource: Send + Sync {
    fn candidate(&self) -> RoomCode;
}

/// Uniform over the whole five-digit space.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn candidate(&self) -> RoomCode {
        RoomCode::from_number(rand::rng().random_range(0..RoomCode::SPACE))
    }
}
