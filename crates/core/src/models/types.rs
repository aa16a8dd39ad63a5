//! Types for catalog entries and their collaborators.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Packed boolean attributes of an item, tested via bitwise AND.
    ///
    /// Bit values are part of the stored format - do not reorder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u32 {
        const ANONYMOUS      = 1;
        const HIDDEN         = 2;
        const TRUSTED        = 4;
        const REMAKE         = 8;
        const COMPLETE       = 16;
        const DELETED        = 32;
        const BANNED         = 64;
        const COMMENT_LOCKED = 128;
    }
}

impl Serialize for ItemFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ItemFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(ItemFlags::from_bits_truncate(bits))
    }
}

/// A registered uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Admins bypass visibility filtering and the page ceiling.
    pub admin: bool,
}

/// A catalog entry (one upload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub display_name: String,
    /// Owning user, if not uploaded anonymously.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<i64>,
    /// Uploader network address (stored binary-packed, 4 or 16 octets).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_ip: Option<IpAddr>,
    /// Size in bytes.
    pub filesize: i64,
    pub created_at: DateTime<Utc>,
    pub flags: ItemFlags,
    pub main_category_id: u32,
    pub sub_category_id: u32,
    /// Denormalized, maintained by comment add/remove.
    pub comment_count: u32,
}

impl Item {
    /// Test whether any flag in `mask` is set.
    pub fn has_any_flag(&self, mask: ItemFlags) -> bool {
        self.flags.intersects(mask)
    }
}

/// Transfer counters, 1:1 with an item, updated by the tracker-sync
/// collaborator. The search engine only reads these.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Statistic {
    pub seed_count: u32,
    pub leech_count: u32,
    pub download_count: u32,
}

/// An item together with its joined statistics, as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedItem {
    #[serde(flatten)]
    pub item: Item,
    pub stats: Statistic,
}

/// Fields needed to create a new item (statistics row starts zeroed).
#[derive(Debug, Clone)]
pub struct NewItem {
    pub display_name: String,
    pub uploader_id: Option<i64>,
    pub uploader_ip: Option<IpAddr>,
    pub filesize: i64,
    pub flags: ItemFlags,
    pub main_category_id: u32,
    pub sub_category_id: u32,
}

/// Pack an address into the stored binary form (4 or 16 octets).
pub fn pack_ip(addr: IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Unpack a stored address; returns `None` for unrecognized lengths.
pub fn unpack_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bits_are_stable() {
        assert_eq!(ItemFlags::ANONYMOUS.bits(), 1);
        assert_eq!(ItemFlags::HIDDEN.bits(), 2);
        assert_eq!(ItemFlags::TRUSTED.bits(), 4);
        assert_eq!(ItemFlags::REMAKE.bits(), 8);
        assert_eq!(ItemFlags::COMPLETE.bits(), 16);
        assert_eq!(ItemFlags::DELETED.bits(), 32);
        assert_eq!(ItemFlags::BANNED.bits(), 64);
        assert_eq!(ItemFlags::COMMENT_LOCKED.bits(), 128);
    }

    #[test]
    fn test_has_any_flag() {
        let item = Item {
            id: 1,
            display_name: "test".to_string(),
            uploader_id: None,
            uploader_ip: None,
            filesize: 0,
            created_at: Utc::now(),
            flags: ItemFlags::HIDDEN | ItemFlags::TRUSTED,
            main_category_id: 1,
            sub_category_id: 1,
            comment_count: 0,
        };

        assert!(item.has_any_flag(ItemFlags::HIDDEN));
        assert!(item.has_any_flag(ItemFlags::HIDDEN | ItemFlags::ANONYMOUS));
        assert!(!item.has_any_flag(ItemFlags::DELETED));
    }

    #[test]
    fn test_flags_serialize_as_bits() {
        let flags = ItemFlags::TRUSTED | ItemFlags::COMPLETE;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "20");

        let parsed: ItemFlags = serde_json::from_str("20").unwrap();
        assert_eq!(parsed, flags);
    }

    #[test]
    fn test_flags_deserialize_drops_unknown_bits() {
        let parsed: ItemFlags = serde_json::from_str("4294967295").unwrap();
        assert_eq!(parsed, ItemFlags::all());
    }

    #[test]
    fn test_pack_unpack_v4() {
        let addr: IpAddr = "192.168.1.42".parse().unwrap();
        let packed = pack_ip(addr);
        assert_eq!(packed.len(), 4);
        assert_eq!(unpack_ip(&packed), Some(addr));
    }

    #[test]
    fn test_pack_unpack_v6() {
        let addr: IpAddr = "2001:db8::1".parse().unwrap();
        let packed = pack_ip(addr);
        assert_eq!(packed.len(), 16);
        assert_eq!(unpack_ip(&packed), Some(addr));
    }

    #[test]
    fn test_unpack_bad_length() {
        assert_eq!(unpack_ip(&[1, 2, 3]), None);
        assert_eq!(unpack_ip(&[]), None);
    }
}
