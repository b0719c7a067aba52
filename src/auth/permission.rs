//! Capability bits and the permission record model.
//!
//! A [`Permissions`] value is a set of [`Permission`] capabilities stored as
//! a bitmask. On the wire it is an array of capability names, e.g.
//! `["read", "share"]`.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    UpdatePermissions,
    Share,
}

impl Permission {
    /// Every capability in bit order.
    pub const ALL: [Permission; 6] = [
        Permission::Read,
        Permission::Create,
        Permission::Update,
        Permission::Delete,
        Permission::UpdatePermissions,
        Permission::Share,
    ];

    /// Bit of this capability in a mask.
    pub fn bit(self) -> u8 {
        match self {
            Permission::Read => 1,
            Permission::Create => 1 << 1,
            Permission::Update => 1 << 2,
            Permission::Delete => 1 << 3,
            Permission::UpdatePermissions => 1 << 4,
            Permission::Share => 1 << 5,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Create => "create",
            Permission::Update => "update",
            Permission::Delete => "delete",
            Permission::UpdatePermissions => "update_permissions",
            Permission::Share => "share",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

/// A set of capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u8);

impl Permissions {
    /// The empty set.
    pub const NONE: Permissions = Permissions(0);
    /// Every capability.
    pub const ALL: Permissions = Permissions(0b11_1111);

    /// Build from a stored mask; unknown bits are dropped.
    pub fn from_bits(bits: i64) -> Self {
        Permissions((bits & Self::ALL.0 as i64) as u8)
    }

    /// Mask for storage.
    pub fn bits(self) -> i64 {
        self.0 as i64
    }

    /// Whether the capability is present.
    pub fn has(self, perm: Permission) -> bool {
        self.0 & perm.bit() != 0
    }

    /// Whether every capability of `other` is present.
    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set union.
    pub fn add(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    /// Set difference.
    pub fn remove(self, other: Permissions) -> Permissions {
        Permissions(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Capabilities present, in bit order.
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.has(*p))
    }

    /// Wire names of the capabilities present.
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Permission::as_str).collect()
    }
}

impl From<Permission> for Permissions {
    fn from(perm: Permission) -> Self {
        Permissions(perm.bit())
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.add(rhs)
    }
}

impl BitOr<Permission> for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permission) -> Self::Output {
        self.add(rhs.into())
    }
}

impl BitOr for Permission {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions::from(self) | rhs
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Permissions::NONE, |acc, p| acc | p)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(", "))
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.iter().count()))?;
        for perm in self.iter() {
            seq.serialize_element(perm.as_str())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PermissionsVisitor;

        impl<'de> Visitor<'de> for PermissionsVisitor {
            type Value = Permissions;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of permission names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Permissions, A::Error> {
                let mut perms = Permissions::NONE;
                while let Some(name) = seq.next_element::<String>()? {
                    let perm = name.parse::<Permission>().map_err(de::Error::custom)?;
                    perms = perms | perm;
                }
                Ok(perms)
            }
        }

        deserializer.deserialize_seq(PermissionsVisitor)
    }
}

/// Kind of principal a permission record applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    User,
    Group,
    Everyone,
}

impl ObjectType {
    /// Stored and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Group => "group",
            ObjectType::Everyone => "everyone",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ObjectType::User),
            "group" => Ok(ObjectType::Group),
            "everyone" => Ok(ObjectType::Everyone),
            other => Err(format!("unknown object type '{other}'")),
        }
    }
}

/// An allow/deny entry attached to a path for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub path: String,
    #[serde(default)]
    pub allow: Permissions,
    #[serde(default)]
    pub deny: Permissions,
    pub object_type: ObjectType,
    /// User id, group name, or empty for [`ObjectType::Everyone`].
    #[serde(default)]
    pub object_id: String,
}

impl PermissionRecord {
    /// Record for a user subject.
    pub fn user(path: &str, subject: &str, allow: Permissions, deny: Permissions) -> Self {
        Self::new(path, ObjectType::User, subject, allow, deny)
    }

    /// Record for a group.
    pub fn group(path: &str, group: &str, allow: Permissions, deny: Permissions) -> Self {
        Self::new(path, ObjectType::Group, group, allow, deny)
    }

    /// Record for everyone.
    pub fn everyone(path: &str, allow: Permissions, deny: Permissions) -> Self {
        Self::new(path, ObjectType::Everyone, "", allow, deny)
    }

    fn new(
        path: &str,
        object_type: ObjectType,
        object_id: &str,
        allow: Permissions,
        deny: Permissions,
    ) -> Self {
        Self {
            path: path.to_string(),
            allow,
            deny,
            object_type,
            object_id: object_id.to_string(),
        }
    }
}
