//! Collection names shared by the propagation handlers and the RPC gateway.

/// Primary: user profiles.
pub const USERS: &str = "users";
/// Primary: course catalog.
pub const COURSES: &str = "courses";

/// Derived: per-user activity log (append-only).
pub const ACTIVITIES: &str = "activities";
/// Derived: change log of course updates.
pub const COURSE_CHANGES: &str = "course_changes";
/// Derived: tombstones for deleted users.
pub const DELETED_USERS: &str = "deleted_users";
