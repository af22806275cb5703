//! # events
//!
//! Defines [`WsEvent`] — ทุก Event ที่ระบบ Broadcast ออกไปผ่าน WebSocket
//! ไปยัง Mini App (activity feed, NAV ticker)
//!
//! ใช้ `tokio::sync::broadcast::Sender<String>` โดยแปลง WsEvent เป็น JSON
//! String ก่อนส่ง เพื่อหลีกเลี่ยง Clone constraints ที่ซับซ้อน

use serde::Serialize;

use crate::models::{ActivityRecord, Vault, VaultId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// User bought into a vault (new tranche).
    Deposited {
        activity: Box<ActivityRecord>,
        unlock_date: chrono::DateTime<chrono::Utc>,
    },

    /// User sold unlocked shares.
    Withdrawn {
        activity: Box<ActivityRecord>,
        position_closed: bool,
    },

    /// Manager created a new vault.
    VaultCreated {
        vault: Box<Vault>,
    },

    /// Manager published a new NAV.
    NavUpdated {
        vault_id: VaultId,
        nav: f64,
    },

    /// Manager took back a vault's safety deposit after its lock.
    SafetyDepositReleased {
        vault_id: VaultId,
        amount: f64,
    },
}

impl WsEvent {
    /// แปลงเป็น JSON String สำหรับส่งผ่าน WebSocket
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag() {
        let json = WsEvent::NavUpdated { vault_id: 3, nav: 1.01 }.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "NAV_UPDATED");
        assert_eq!(value["vault_id"], 3);
    }
}
