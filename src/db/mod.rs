mod configfiles;
mod ippools;
pub(crate) mod row_helpers;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;
use crate::tree::ConfigTree;

use configfiles::ConfigfileRepo;
use ippools::{EndpointRepo, IpPoolRepo, NetGwRepo};

/// Typed error for "resource not found" — enables reliable downcast
/// in the API error handler instead of fragile string matching.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with the default pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ========== Configfile Operations ==========

    pub async fn list_configfiles(&self) -> Result<Vec<Configfile>> {
        ConfigfileRepo::list(&self.pool).await
    }

    pub async fn list_configfiles_with_trashed(&self) -> Result<Vec<Configfile>> {
        ConfigfileRepo::list_with_trashed(&self.pool).await
    }

    pub async fn get_configfile(&self, id: i64) -> Result<Option<Configfile>> {
        ConfigfileRepo::get(&self.pool, id).await
    }

    /// Load every configfile, soft-deleted included, into an in-memory tree
    pub async fn load_configfile_tree(&self) -> Result<ConfigTree> {
        Ok(ConfigTree::new(self.list_configfiles_with_trashed().await?))
    }

    pub async fn max_configfile_id(&self) -> Result<Option<i64>> {
        ConfigfileRepo::max_id(&self.pool).await
    }

    pub async fn create_configfile(&self, req: &CreateConfigfileRequest) -> Result<Configfile> {
        ConfigfileRepo::create(&self.pool, req).await
    }

    pub async fn update_configfile(&self, id: i64, req: &CreateConfigfileRequest) -> Result<Configfile> {
        ConfigfileRepo::update(&self.pool, id, req).await
    }

    /// Insert configfiles under preassigned ids, all or nothing
    pub async fn insert_configfiles(&self, nodes: &[(i64, CreateConfigfileRequest)]) -> Result<()> {
        ConfigfileRepo::insert_many(&self.pool, nodes).await
    }

    pub async fn delete_configfile(&self, id: i64) -> Result<()> {
        ConfigfileRepo::soft_delete(&self.pool, id).await
    }

    pub async fn restore_configfile(&self, id: i64) -> Result<Configfile> {
        ConfigfileRepo::restore(&self.pool, id).await
    }

    /// Push a node's device class down to every descendant that differs.
    /// Runs after the node itself was committed; returns the ids rewritten.
    pub async fn propagate_device_class(&self, id: i64) -> Result<Vec<i64>> {
        let tree = self.load_configfile_tree().await?;
        let device = tree
            .get(id)
            .ok_or_else(|| NotFoundError::new("Configfile", &id.to_string()))?
            .device;

        let touched: Vec<i64> = tree
            .descendants(id)?
            .into_iter()
            .filter(|d| tree.get(*d).is_some_and(|n| n.device != device))
            .collect();

        if !touched.is_empty() {
            ConfigfileRepo::set_device(&self.pool, &touched, device).await?;
            tracing::info!(
                "Propagated device class {} from configfile {} to {:?}",
                device.map(|d| d.as_str()).unwrap_or("none"),
                id,
                touched
            );
        }
        Ok(touched)
    }

    // ========== NetGw Operations ==========

    pub async fn list_netgws(&self) -> Result<Vec<NetGw>> {
        NetGwRepo::list(&self.pool).await
    }

    pub async fn get_netgw(&self, id: i64) -> Result<Option<NetGw>> {
        NetGwRepo::get(&self.pool, id).await
    }

    pub async fn create_netgw(&self, req: &CreateNetGwRequest) -> Result<NetGw> {
        NetGwRepo::create(&self.pool, req).await
    }

    pub async fn update_netgw(&self, id: i64, req: &CreateNetGwRequest) -> Result<NetGw> {
        NetGwRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_netgw(&self, id: i64) -> Result<()> {
        NetGwRepo::delete(&self.pool, id).await
    }

    // ========== IpPool Operations ==========

    pub async fn list_ippools(&self) -> Result<Vec<IpPool>> {
        IpPoolRepo::list(&self.pool).await
    }

    pub async fn list_ippools_by_netgw(&self, netgw_id: i64) -> Result<Vec<IpPool>> {
        IpPoolRepo::list_by_netgw(&self.pool, netgw_id).await
    }

    pub async fn get_ippool(&self, id: i64) -> Result<Option<IpPool>> {
        IpPoolRepo::get(&self.pool, id).await
    }

    pub async fn create_ippool(&self, req: &CreateIpPoolRequest) -> Result<IpPool> {
        IpPoolRepo::create(&self.pool, req).await
    }

    pub async fn update_ippool(&self, id: i64, req: &CreateIpPoolRequest) -> Result<IpPool> {
        IpPoolRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_ippool(&self, id: i64) -> Result<()> {
        IpPoolRepo::delete(&self.pool, id).await
    }

    // ========== Endpoint Operations ==========

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        EndpointRepo::list(&self.pool).await
    }

    pub async fn list_fixed_ip_endpoints(&self) -> Result<Vec<Endpoint>> {
        EndpointRepo::list_fixed_ip(&self.pool).await
    }

    pub async fn get_endpoint(&self, id: i64) -> Result<Option<Endpoint>> {
        EndpointRepo::get(&self.pool, id).await
    }

    pub async fn create_endpoint(&self, req: &CreateEndpointRequest) -> Result<Endpoint> {
        EndpointRepo::create(&self.pool, req).await
    }

    pub async fn update_endpoint(&self, id: i64, req: &CreateEndpointRequest) -> Result<Endpoint> {
        EndpointRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_endpoint(&self, id: i64) -> Result<()> {
        EndpointRepo::delete(&self.pool, id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::with_pool_size(path.to_str().unwrap(), 1).await.unwrap();
        (dir, store)
    }

    pub(crate) fn cf(name: &str, parent_id: Option<i64>, text: &str) -> CreateConfigfileRequest {
        CreateConfigfileRequest {
            name: name.to_string(),
            device: Some(DeviceClass::Cm),
            parent_id,
            text: text.to_string(),
            firmware: String::new(),
            cvc: String::new(),
            public: true,
        }
    }

    #[tokio::test]
    async fn test_configfile_crud_and_soft_delete() {
        let (_dir, store) = test_store().await;

        let root = store.create_configfile(&cf("base", None, "NetworkAccess 1;")).await.unwrap();
        let leaf = store.create_configfile(&cf("leaf", Some(root.id), "MaxCPE 4;")).await.unwrap();
        assert_eq!(leaf.parent_id, Some(root.id));
        assert_eq!(leaf.device, Some(DeviceClass::Cm));

        let mut changed = cf("leaf-renamed", Some(root.id), "MaxCPE 8;");
        changed.public = false;
        let updated = store.update_configfile(leaf.id, &changed).await.unwrap();
        assert_eq!(updated.name, "leaf-renamed");
        assert!(!updated.public);

        store.delete_configfile(leaf.id).await.unwrap();
        assert_eq!(store.list_configfiles().await.unwrap().len(), 1);
        assert_eq!(store.list_configfiles_with_trashed().await.unwrap().len(), 2);
        assert!(store.get_configfile(leaf.id).await.unwrap().unwrap().is_deleted());
        assert_eq!(store.max_configfile_id().await.unwrap(), Some(leaf.id));

        // deleting twice is a not-found
        let err = store.delete_configfile(leaf.id).await.unwrap_err();
        assert!(err.downcast_ref::<NotFoundError>().is_some());

        let restored = store.restore_configfile(leaf.id).await.unwrap();
        assert!(!restored.is_deleted());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_dir, store) = test_store().await;
        let err = store.update_configfile(99, &cf("x", None, "")).await.unwrap_err();
        assert!(err.downcast_ref::<NotFoundError>().is_some());
    }

    #[tokio::test]
    async fn test_propagate_device_class() {
        let (_dir, store) = test_store().await;
        let root = store.create_configfile(&cf("root", None, "")).await.unwrap();
        let mid = store.create_configfile(&cf("mid", Some(root.id), "")).await.unwrap();
        let leaf = store.create_configfile(&cf("leaf", Some(mid.id), "")).await.unwrap();
        let other = store.create_configfile(&cf("other", None, "")).await.unwrap();

        let mut as_mta = cf("root", None, "");
        as_mta.device = Some(DeviceClass::Mta);
        store.update_configfile(root.id, &as_mta).await.unwrap();

        let touched = store.propagate_device_class(root.id).await.unwrap();
        assert_eq!(touched, vec![mid.id, leaf.id]);
        assert_eq!(store.get_configfile(leaf.id).await.unwrap().unwrap().device, Some(DeviceClass::Mta));
        assert_eq!(store.get_configfile(other.id).await.unwrap().unwrap().device, Some(DeviceClass::Cm));

        // already consistent
        assert!(store.propagate_device_class(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_configfiles_is_atomic() {
        let (_dir, store) = test_store().await;
        let existing = store.create_configfile(&cf("existing", None, "")).await.unwrap();

        // second row collides with an existing primary key
        let batch = vec![(existing.id + 1, cf("a", None, "")), (existing.id, cf("b", None, ""))];
        assert!(store.insert_configfiles(&batch).await.is_err());
        assert_eq!(store.list_configfiles_with_trashed().await.unwrap().len(), 1);

        let batch = vec![(10, cf("a", None, "")), (11, cf("b", Some(10), ""))];
        store.insert_configfiles(&batch).await.unwrap();
        assert_eq!(store.get_configfile(11).await.unwrap().unwrap().parent_id, Some(10));
    }

    #[tokio::test]
    async fn test_netgw_pools_and_endpoints() {
        let (_dir, store) = test_store().await;
        let gw = store
            .create_netgw(&CreateNetGwRequest {
                hostname: "cmts-1".to_string(),
                ip: "10.255.0.1".to_string(),
            })
            .await
            .unwrap();

        let pool = store
            .create_ippool(&CreateIpPoolRequest {
                netgw_id: gw.id,
                pool_type: PoolType::CpePub,
                net: "10.0.0.0".to_string(),
                netmask: "255.255.255.0".to_string(),
                ip_pool_start: "10.0.0.10".to_string(),
                ip_pool_end: "10.0.0.20".to_string(),
                router_ip: "10.0.0.1".to_string(),
                broadcast_ip: None,
                version: 4,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(pool.pool_type, PoolType::CpePub);
        assert_eq!(pool.broadcast_ip, None);
        assert_eq!(store.get_netgw(gw.id).await.unwrap().unwrap().pool_count, Some(1));

        for (mac, fixed) in [("00:00:00:00:00:01", true), ("00:00:00:00:00:02", false)] {
            store
                .create_endpoint(&CreateEndpointRequest {
                    hostname: "cpe".to_string(),
                    mac: mac.to_string(),
                    endpoint_type: EndpointType::Cpe,
                    fixed_ip: fixed,
                    ip: Some("10.0.0.15".to_string()),
                    description: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.list_fixed_ip_endpoints().await.unwrap().len(), 1);

        store.delete_netgw(gw.id).await.unwrap();
        assert!(store.list_ippools_by_netgw(gw.id).await.unwrap().is_empty());
    }
}
