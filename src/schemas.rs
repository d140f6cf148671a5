// Response entities of the storage service.
//
// These are read-only projections of server state; nothing here is cached
// or mutated by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Ranked capability level. Checks are "at least", never exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PermissionLevel {
    #[default]
    None,
    Read,
    Write,
    Manage,
    Delete,
    Owner,
}

impl PermissionLevel {
    /// Wire value used by the service.
    pub fn code(self) -> u8 {
        match self {
            PermissionLevel::None => 0,
            PermissionLevel::Read => 10,
            PermissionLevel::Write => 20,
            PermissionLevel::Manage => 30,
            PermissionLevel::Delete => 40,
            PermissionLevel::Owner => 100,
        }
    }

    pub fn can_read(self) -> bool {
        self >= PermissionLevel::Read
    }

    pub fn can_write(self) -> bool {
        self >= PermissionLevel::Write
    }

    pub fn can_manage(self) -> bool {
        self >= PermissionLevel::Manage
    }

    pub fn can_delete(self) -> bool {
        self >= PermissionLevel::Delete
    }

    pub fn is_owner(self) -> bool {
        self >= PermissionLevel::Owner
    }
}

impl TryFrom<u8> for PermissionLevel {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PermissionLevel::None),
            10 => Ok(PermissionLevel::Read),
            20 => Ok(PermissionLevel::Write),
            30 => Ok(PermissionLevel::Manage),
            40 => Ok(PermissionLevel::Delete),
            100 => Ok(PermissionLevel::Owner),
            other => Err(format!("unknown permission level {other}")),
        }
    }
}

impl From<PermissionLevel> for u8 {
    fn from(level: PermissionLevel) -> Self {
        level.code()
    }
}

/// A permission record. Used as-is for the public permission of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    #[serde(default)]
    pub permission: PermissionLevel,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub meta_data: Option<Map<String, Value>>,
}

impl Default for PermissionGrant {
    fn default() -> Self {
        let now = Utc::now();
        PermissionGrant {
            permission: PermissionLevel::None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            meta_data: None,
        }
    }
}

/// Permission record held by one user on one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermission {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub grant: PermissionGrant,
}

fn default_content_type() -> String {
    "image/webp".into()
}

fn default_size() -> u64 {
    4096
}

/// A stored file or directory entry.
///
/// For directories (`is_directory`), `filehash` and `size` carry no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub uid: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub is_directory: bool,
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_size")]
    pub size: u64,
    #[serde(default)]
    pub filehash: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub permissions: Vec<UserPermission>,
    #[serde(default)]
    pub public_permission: PermissionGrant,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(with = "timestamp::option", default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta_data: Option<Map<String, Value>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl FileItem {
    /// Effective level of `user_id` on this file: the owner gets
    /// [`PermissionLevel::Owner`], everyone else the higher of their own
    /// record and the public level.
    pub fn permission_for(&self, user_id: Uuid) -> PermissionLevel {
        if user_id == self.user_id {
            return PermissionLevel::Owner;
        }
        let public = if self.public_permission.is_deleted {
            PermissionLevel::None
        } else {
            self.public_permission.permission
        };
        self.permissions
            .iter()
            .filter(|p| p.user_id == user_id && !p.grant.is_deleted)
            .map(|p| p.grant.permission)
            .fold(public, Ord::max)
    }
}

/// Timestamps as the service writes them: RFC 3339, or naive ISO-8601 in UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "uid": "6f1c2a7e-5d1b-4c51-9d55-0d7b6c1e8a01",
            "user_id": "0b4f0d0e-52c3-4a44-8e5e-7e3a0c1f9b22",
            "business_name": "pixiee",
            "parent_id": null,
            "filename": "cat.png",
            "content_type": "image/png",
            "size": 1234,
            "filehash": "abc123",
            "url": "https://media.example.io/f/cat.png",
            "permissions": [{
                "user_id": "9a0e2b11-0c4c-4f2e-bd3b-55e7a1c0d333",
                "permission": 20,
                "created_at": "2024-05-01T10:00:00",
                "updated_at": "2024-05-01T10:00:00"
            }],
            "public_permission": {"permission": 10},
            "is_deleted": false,
            "meta_data": {"tags": ["a", "b"]},
            "created_at": "2024-05-01T10:00:00.123000",
            "updated_at": "2024-05-02T08:30:00+00:00"
        })
    }

    #[test]
    fn test_decode_file_item() {
        let item: FileItem = serde_json::from_value(sample()).unwrap();
        assert_eq!(item.filename, "cat.png");
        assert_eq!(item.size, 1234);
        assert!(!item.is_directory);
        assert_eq!(item.parent_id, None);
        assert_eq!(item.deleted_at, None);
        assert_eq!(item.permissions[0].grant.permission, PermissionLevel::Write);
        assert_eq!(item.public_permission.permission, PermissionLevel::Read);
        assert_eq!(item.created_at.to_rfc3339(), "2024-05-01T10:00:00.123+00:00");
    }

    #[test]
    fn test_file_item_defaults() {
        let item: FileItem = serde_json::from_value(json!({
            "uid": "6f1c2a7e-5d1b-4c51-9d55-0d7b6c1e8a01",
            "user_id": "0b4f0d0e-52c3-4a44-8e5e-7e3a0c1f9b22",
            "business_name": "pixiee",
            "filename": "docs",
            "is_directory": true,
            "created_at": "2024-05-01T10:00:00",
            "updated_at": "2024-05-01T10:00:00"
        }))
        .unwrap();
        assert!(item.is_directory);
        assert_eq!(item.content_type, "image/webp");
        assert_eq!(item.size, 4096);
        assert!(item.permissions.is_empty());
        assert_eq!(item.public_permission.permission, PermissionLevel::None);
    }

    #[test]
    fn test_permission_wire_codes() {
        assert_eq!(serde_json::to_value(PermissionLevel::Manage).unwrap(), json!(30));
        let level: PermissionLevel = serde_json::from_value(json!(100)).unwrap();
        assert_eq!(level, PermissionLevel::Owner);
        assert!(serde_json::from_value::<PermissionLevel>(json!(15)).is_err());
    }

    #[test]
    fn test_permission_thresholds() {
        assert!(PermissionLevel::Delete.can_write());
        assert!(PermissionLevel::Delete.can_delete());
        assert!(!PermissionLevel::Delete.is_owner());
        assert!(!PermissionLevel::None.can_read());
        assert!(PermissionLevel::Owner.can_manage());
    }

    #[test]
    fn test_permission_for() {
        let item: FileItem = serde_json::from_value(sample()).unwrap();
        let owner = item.user_id;
        let writer = item.permissions[0].user_id;
        assert_eq!(item.permission_for(owner), PermissionLevel::Owner);
        assert_eq!(item.permission_for(writer), PermissionLevel::Write);
        assert_eq!(item.permission_for(Uuid::new_v4()), PermissionLevel::Read);
    }

    #[test]
    fn test_invalid_timestamp_rejected() {
        let mut value = sample();
        value["created_at"] = json!("yesterday");
        assert!(serde_json::from_value::<FileItem>(value).is_err());
    }
}
