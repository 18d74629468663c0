// src/permissions.rs
// Capability set and role-based permission checks

use std::collections::{HashMap, HashSet};

/// The closed set of capabilities the engine consults before dispatching an
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    // Database operations
    CreateDb,
    DropDb,
    UseDb,

    // Collection operations
    CreateCollection,
    DropCollection,

    // Document operations
    Insert,
    Update,
    Delete,
    Read,

    // Index operations
    CreateIndex,
    ListIndexes,

    // Transaction operations
    BeginTx,
    Commit,
    Rollback,

    // Backup operations
    Backup,
    Restore,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CreateDb => "CREATE_DB",
            Permission::DropDb => "DROP_DB",
            Permission::UseDb => "USE_DB",
            Permission::CreateCollection => "CREATE_COLL",
            Permission::DropCollection => "DROP_COLL",
            Permission::Insert => "INSERT",
            Permission::Update => "UPDATE",
            Permission::Delete => "DELETE",
            Permission::Read => "READ",
            Permission::CreateIndex => "CREATE_INDEX",
            Permission::ListIndexes => "LIST_INDEXES",
            Permission::BeginTx => "BEGIN_TX",
            Permission::Commit => "COMMIT",
            Permission::Rollback => "ROLLBACK",
            Permission::Backup => "BACKUP",
            Permission::Restore => "RESTORE",
        }
    }

    pub const ALL: [Permission; 16] = [
        Permission::CreateDb,
        Permission::DropDb,
        Permission::UseDb,
        Permission::CreateCollection,
        Permission::DropCollection,
        Permission::Insert,
        Permission::Update,
        Permission::Delete,
        Permission::Read,
        Permission::CreateIndex,
        Permission::ListIndexes,
        Permission::BeginTx,
        Permission::Commit,
        Permission::Rollback,
        Permission::Backup,
        Permission::Restore,
    ];
}

/// A named bundle of permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub permissions: HashSet<Permission>,
}

impl Role {
    pub fn new(name: &str, permissions: impl IntoIterator<Item = Permission>) -> Role {
        Role {
            name: name.to_string(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// Role registry with the built-in `admin`, `read_write` and `read` roles
pub struct PermissionManager {
    roles: HashMap<String, Role>,
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionManager {
    pub fn new() -> PermissionManager {
        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), Role::new("admin", Permission::ALL));
        roles.insert(
            "read_write".to_string(),
            Role::new(
                "read_write",
                [
                    Permission::UseDb,
                    Permission::Insert,
                    Permission::Update,
                    Permission::Delete,
                    Permission::Read,
                    Permission::ListIndexes,
                ],
            ),
        );
        roles.insert(
            "read".to_string(),
            Role::new(
                "read",
                [Permission::UseDb, Permission::Read, Permission::ListIndexes],
            ),
        );
        PermissionManager { roles }
    }

    /// Register or replace a role
    pub fn add_role(&mut self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// True when any of the named roles grants the permission; unknown role
    /// names grant nothing.
    pub fn check_permission(&self, role_names: &[String], permission: Permission) -> bool {
        role_names.iter().any(|name| {
            self.roles
                .get(name)
                .map(|role| role.permissions.contains(&permission))
                .unwrap_or(false)
        })
    }
}
