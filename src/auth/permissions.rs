use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use moka::future::Cache;
use sqlx::MySqlPool;
use tracing::{error, info};

use crate::error::AppError;
use crate::model::permission::{ALL_PERMISSIONS, default_permissions};
use crate::model::role::Role;

pub type PermissionSet = Arc<HashSet<String>>;

/// Role → permission names, loaded from `role_has_permissions`.
pub struct PermissionCache {
    cache: Cache<u8, PermissionSet>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn permissions_for(
        &self,
        pool: &MySqlPool,
        role: Role,
    ) -> Result<PermissionSet, AppError> {
        self.cache
            .try_get_with(role.id(), load_role_permissions(pool, role))
            .await
            .map_err(|e| {
                error!(error = %e, role = role.id(), "Failed to load role permissions");
                AppError::Internal("permission lookup failed".into())
            })
    }

    pub async fn insert(&self, role: Role, permissions: PermissionSet) {
        self.cache.insert(role.id(), permissions).await;
    }

    pub async fn invalidate(&self, role: Role) {
        self.cache.invalidate(&role.id()).await;
    }
}

async fn load_role_permissions(pool: &MySqlPool, role: Role) -> Result<PermissionSet, sqlx::Error> {
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT p.name
        FROM role_has_permissions rhp
        JOIN permissions p ON p.id = rhp.permission_id
        WHERE rhp.role_id = ?
        "#,
    )
    .bind(role.id())
    .fetch_all(pool)
    .await?;

    Ok(Arc::new(names.into_iter().collect()))
}

/// Registers every known permission and grants role defaults to roles that
/// have no grants yet. Safe to run on every start.
pub async fn seed_default_permissions(pool: &MySqlPool) -> Result<()> {
    for name in ALL_PERMISSIONS.iter() {
        sqlx::query("INSERT IGNORE INTO permissions (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    for role in Role::ALL {
        let granted = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM role_has_permissions WHERE role_id = ?",
        )
        .bind(role.id())
        .fetch_one(pool)
        .await?;
        if granted > 0 {
            continue;
        }

        for name in default_permissions(role) {
            sqlx::query(
                r#"
                INSERT IGNORE INTO role_has_permissions (role_id, permission_id)
                SELECT ?, id FROM permissions WHERE name = ?
                "#,
            )
            .bind(role.id())
            .bind(&name)
            .execute(pool)
            .await?;
        }
        info!(role = role.id(), "Seeded default permissions");
    }

    Ok(())
}

/// Loads every role's permission set into the cache.
pub async fn warmup_permission_cache(pool: &MySqlPool, cache: &PermissionCache) -> Result<()> {
    let mut total = 0usize;
    for role in Role::ALL {
        let permissions = load_role_permissions(pool, role).await?;
        total += permissions.len();
        cache.insert(role, permissions).await;
    }
    info!(
        "Permission cache warmup complete: {} grants across {} roles",
        total,
        Role::ALL.len()
    );
    Ok(())
}
