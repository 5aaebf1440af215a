/// Router Module Index
///
/// Routes are split by who may call them. Access control is attached per
/// group in `create_router`, so a handler can never end up in a group with
/// weaker guards by accident.

/// Anonymous, read-only routes plus login/logout.
pub mod public;

/// Routes behind `require_auth`: any logged-in admin.
pub mod authenticated;

/// Routes behind `require_auth` and `require_superadmin`.
pub mod admin;
