//! Attribute names and object classes used by sysdb entries.

pub const CN: &str = "cn";
pub const NAME: &str = "name";
pub const OBJECT_CLASS: &str = "objectClass";

pub const USER_CLASS: &str = "user";
pub const GROUP_CLASS: &str = "group";
pub const CONTAINER_CLASS: &str = "container";

pub const UID_NUMBER: &str = "uidNumber";
pub const GID_NUMBER: &str = "gidNumber";
pub const USER_PASSWORD: &str = "userPassword";
pub const GECOS: &str = "gecos";
pub const HOME_DIRECTORY: &str = "homeDirectory";
pub const LOGIN_SHELL: &str = "loginShell";

/// Group side of the membership relation: account DNs.
pub const MEMBER: &str = "member";
/// Account side of the membership relation: group DNs.
pub const MEMBER_OF: &str = "memberOf";
