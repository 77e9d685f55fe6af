use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Configfile routes
        .route("/api/configfiles", get(handlers::configfiles::list_configfiles))
        .route("/api/configfiles", post(handlers::configfiles::create_configfile))
        .route("/api/configfiles/tree", get(handlers::configfiles::get_configfile_tree))
        .route("/api/configfiles/import", post(handlers::configfiles::import_configfiles))
        .route("/api/configfiles/:id", get(handlers::configfiles::get_configfile))
        .route("/api/configfiles/:id", put(handlers::configfiles::update_configfile))
        .route("/api/configfiles/:id", delete(handlers::configfiles::delete_configfile))
        .route("/api/configfiles/:id/restore", post(handlers::configfiles::restore_configfile))
        .route("/api/configfiles/:id/effective", get(handlers::configfiles::get_effective_config))
        .route("/api/configfiles/:id/build", post(handlers::configfiles::build_configfile))
        .route("/api/configfiles/:id/export", get(handlers::configfiles::export_configfile))
        // Network gateway routes
        .route("/api/netgws", get(handlers::ippools::list_netgws))
        .route("/api/netgws", post(handlers::ippools::create_netgw))
        .route("/api/netgws/:id", get(handlers::ippools::get_netgw))
        .route("/api/netgws/:id", put(handlers::ippools::update_netgw))
        .route("/api/netgws/:id", delete(handlers::ippools::delete_netgw))
        .route("/api/netgws/:id/dhcp", get(handlers::ippools::preview_netgw_dhcp))
        .route("/api/netgws/:id/dhcp", post(handlers::ippools::write_netgw_dhcp))
        // IP pool routes
        .route("/api/ippools", get(handlers::ippools::list_ippools))
        .route("/api/ippools", post(handlers::ippools::create_ippool))
        .route("/api/ippools/:id", get(handlers::ippools::get_ippool))
        .route("/api/ippools/:id", put(handlers::ippools::update_ippool))
        .route("/api/ippools/:id", delete(handlers::ippools::delete_ippool))
        .route("/api/ippools/:id/ranges", get(handlers::ippools::get_ippool_ranges))
        // Endpoint routes
        .route("/api/endpoints", get(handlers::ippools::list_endpoints))
        .route("/api/endpoints", post(handlers::ippools::create_endpoint))
        .route("/api/endpoints/:id", get(handlers::ippools::get_endpoint))
        .route("/api/endpoints/:id", put(handlers::ippools::update_endpoint))
        .route("/api/endpoints/:id", delete(handlers::ippools::delete_endpoint))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::compiler::tests::FakeEncoder;
    use crate::compiler::ParameterCompiler;
    use crate::config::Config;
    use crate::db::tests::test_store;
    use crate::dhcp::DhcpConfigWriter;

    async fn test_app() -> (tempfile::TempDir, tempfile::TempDir, Router) {
        let (db_dir, store) = test_store().await;
        let prov = tempfile::tempdir().unwrap();
        let mut config = Config::load();
        config.prov_dir = prov.path().to_string_lossy().to_string();

        let state = Arc::new(AppState {
            compiler: ParameterCompiler::new(prov.path(), prov.path().join("keyfile"), FakeEncoder::accepting()),
            dhcp: DhcpConfigWriter::new(prov.path().join("netgws"), prov.path().join("dhcpd.conf")),
            import_lock: tokio::sync::Mutex::new(()),
            store,
            config,
        });
        (db_dir, prov, build(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    #[tokio::test]
    async fn test_export_then_import_over_http() {
        let (_db, _prov, app) = test_app().await;

        let (status, _, root) = call(&app, "POST", "/api/configfiles", Some(serde_json::json!({
            "name": "base", "device": "cm", "text": "NetworkAccess 1;"
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let root_id = root["id"].as_i64().unwrap();

        let (status, _, _) = call(&app, "POST", "/api/configfiles", Some(serde_json::json!({
            "name": "leaf", "device": "cm", "parent_id": root_id, "text": "MaxCPE 4;"
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, headers, exported) = call(&app, "GET", &format!("/api/configfiles/{}/export", root_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"base.json\""
        );
        assert_eq!(exported["children"][0]["name"], "leaf");

        let (status, _, report) = call(&app, "POST", "/api/configfiles/import", Some(serde_json::json!({
            "content": exported.to_string()
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["created"], serde_json::json!([3, 4]));

        let (_, _, effective) = call(&app, "GET", "/api/configfiles/4/effective", None).await;
        assert_eq!(effective["text"], "NetworkAccess 1;\nMaxCPE 4;");
        assert_eq!(effective["chain"][0]["name"], "base (2)");
    }

    #[tokio::test]
    async fn test_device_change_propagates() {
        let (_db, _prov, app) = test_app().await;
        call(&app, "POST", "/api/configfiles", Some(serde_json::json!({"name": "a", "device": "cm"}))).await;
        call(&app, "POST", "/api/configfiles", Some(serde_json::json!({"name": "b", "device": "cm", "parent_id": 1}))).await;

        let (status, _, resp) = call(&app, "PUT", "/api/configfiles/1", Some(serde_json::json!({"name": "a", "device": "mta"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["propagated_to"], serde_json::json!([2]));

        // a parent with live children cannot be deleted
        let (status, _, _) = call(&app, "DELETE", "/api/configfiles/1", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_restore_requires_live_parent() {
        let (_db, _prov, app) = test_app().await;
        call(&app, "POST", "/api/configfiles", Some(serde_json::json!({"name": "a", "device": "cm", "text": "MaxCPE 2;"}))).await;
        call(&app, "POST", "/api/configfiles", Some(serde_json::json!({"name": "b", "device": "cm", "parent_id": 1}))).await;
        assert_eq!(call(&app, "DELETE", "/api/configfiles/2", None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(call(&app, "DELETE", "/api/configfiles/1", None).await.0, StatusCode::NO_CONTENT);

        let (status, _, body) = call(&app, "POST", "/api/configfiles/2/restore", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "parent configfile 1 is deleted; restore it first");

        let (status, _, _) = call(&app, "POST", "/api/configfiles/1/restore", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, restored) = call(&app, "POST", "/api/configfiles/2/restore", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(restored["deleted_at"].is_null());
    }

    #[tokio::test]
    async fn test_missing_device_is_unprocessable() {
        let (_db, _prov, app) = test_app().await;
        let (status, _, body) = call(&app, "POST", "/api/configfiles", Some(serde_json::json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Configfile has no device class");
    }

    #[tokio::test]
    async fn test_pool_ranges_endpoint() {
        let (_db, _prov, app) = test_app().await;
        call(&app, "POST", "/api/netgws", Some(serde_json::json!({"hostname": "cmts-1", "ip": "10.255.0.1"}))).await;
        let (status, _, pool) = call(&app, "POST", "/api/ippools", Some(serde_json::json!({
            "netgw_id": 1, "type": "CPEPub", "net": "10.0.0.0", "netmask": "255.255.255.0",
            "ip_pool_start": "10.0.0.10", "ip_pool_end": "10.0.0.20", "router_ip": "10.0.0.1"
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);

        for ip in ["10.0.0.12", "10.0.0.13", "10.0.0.17"] {
            let (status, _, _) = call(&app, "POST", "/api/endpoints", Some(serde_json::json!({
                "hostname": "cpe", "mac": "00:11:22:33:44:55", "type": "cpe", "fixed_ip": true, "ip": ip
            })))
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, _, ranges) = call(&app, "GET", &format!("/api/ippools/{}/ranges", pool["id"]), None).await;
        assert_eq!(ranges["cidr"], "/24");
        assert_eq!(ranges["wildcard_mask"], "0.0.0.255");
        assert_eq!(
            ranges["ranges"],
            serde_json::json!([
                ["10.0.0.10", "10.0.0.11"],
                ["10.0.0.14", "10.0.0.16"],
                ["10.0.0.18", "10.0.0.20"]
            ])
        );
    }
}
