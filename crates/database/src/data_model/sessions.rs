use model::collaborators::{SessionRecord, SessionToken};
use sqlx::prelude::FromRow;
use utility::id::Id;

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub token: String,
    pub user_id: i64,
    pub ip: String,
    pub port: i32,
}

impl SessionRow {
    pub fn to_model(self) -> SessionRecord {
        SessionRecord {
            token: SessionToken(self.token),
            user_id: Id::new(self.user_id),
            ip: self.ip,
            port: self.port as u16,
        }
    }
}
