use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use super::pools::{broadcast_address, is_secondary};
use super::ranges::{pool_ranges, range_clause};
use crate::models::{Endpoint, IpPool, NetGw};
use crate::utils::dotted_netmask;

const SHARED_NETWORK_TEMPLATE: &str = r#"shared-network "{{ hostname }}"
{
{%- for pool in pools %}
	subnet {{ pool.net }} netmask {{ pool.netmask }}{% if pool.secondary %} # secondary{% endif %}
	{
		option routers {{ pool.router_ip }};
{%- if pool.broadcast_ip %}
		option broadcast-address {{ pool.broadcast_ip }};
{%- endif %}
{%- if pool.ranges | length > 0 %}

		pool
		{
{%- for range in pool.ranges %}
			{{ range }}
{%- endfor %}
{%- for rule in pool.rules %}
			{{ rule }};
{%- endfor %}
		}
{%- endif %}
	}
{%- endfor %}
}
"#;

/// Writes per-gateway dhcpd fragments and keeps the include lines in the
/// main dhcpd.conf in sync
#[derive(Debug, Clone)]
pub struct DhcpConfigWriter {
    conf_dir: PathBuf,
    dhcpd_conf: PathBuf,
}

impl DhcpConfigWriter {
    pub fn new(conf_dir: impl Into<PathBuf>, dhcpd_conf: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            dhcpd_conf: dhcpd_conf.into(),
        }
    }

    pub fn file_path(&self, hostname: &str) -> PathBuf {
        self.conf_dir.join(format!("{}.conf", hostname))
    }

    /// Render the shared-network block of a gateway. Only v4 pools are
    /// rendered; `pools` must be in id order.
    pub fn render(&self, netgw: &NetGw, pools: &[IpPool], endpoints: &[Endpoint]) -> Result<String> {
        let mut tera = Tera::default();
        tera.add_raw_template("shared-network", SHARED_NETWORK_TEMPLATE)
            .map_err(|e| anyhow::anyhow!("Invalid dhcp template: {}", e))?;

        let mut rendered_pools = Vec::new();
        for p in pools.iter().filter(|p| p.version == 4) {
            let netmask = dotted_netmask(&p.netmask)
                .map_err(|e| anyhow::anyhow!("Pool {}: {}", p.id, e))?;
            let ranges: Vec<String> = pool_ranges(p, endpoints)
                .iter()
                .map(|(start, end)| range_clause(start, end))
                .collect();
            if ranges.is_empty() {
                tracing::warn!(
                    "Pool {} on {} has no free addresses, leaving out its pool block",
                    p.id,
                    netgw.hostname
                );
            }

            rendered_pools.push(serde_json::json!({
                "net": p.net,
                "netmask": netmask,
                "router_ip": p.router_ip,
                "broadcast_ip": broadcast_address(p).unwrap_or_default(),
                "secondary": is_secondary(p, pools),
                "ranges": ranges,
                "rules": p.pool_type.membership_rules(),
            }));
        }

        let mut context = Context::new();
        context.insert("hostname", &netgw.hostname);
        context.insert("pools", &rendered_pools);

        tera.render("shared-network", &context)
            .map_err(|e| anyhow::anyhow!("DHCP rendering failed: {}", e))
    }

    /// Render and write the gateway file, then make sure dhcpd.conf includes it
    pub async fn write(&self, netgw: &NetGw, pools: &[IpPool], endpoints: &[Endpoint]) -> Result<(PathBuf, String)> {
        let content = self.render(netgw, pools, endpoints)?;
        let path = self.file_path(&netgw.hostname);

        tokio::fs::create_dir_all(&self.conf_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.conf_dir.display()))?;
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.ensure_include(&path).await?;
        tracing::info!("Wrote DHCP config for {} to {}", netgw.hostname, path.display());
        Ok((path, content))
    }

    /// Remove the gateway file and its include line
    pub async fn remove(&self, hostname: &str) -> Result<()> {
        let path = self.file_path(hostname);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("Removed DHCP config {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
        self.remove_include(&path).await
    }

    async fn read_dhcpd_conf(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.dhcpd_conf).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.dhcpd_conf.display())),
        }
    }

    async fn ensure_include(&self, file: &Path) -> Result<()> {
        if let Some(dir) = self.dhcpd_conf.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let needle = file.to_string_lossy();
        let mut conf = self.read_dhcpd_conf().await?;
        if conf.lines().any(|l| l.contains(needle.as_ref())) {
            return Ok(());
        }

        if !conf.is_empty() && !conf.ends_with('\n') {
            conf.push('\n');
        }
        conf.push_str(&include_line(file));
        conf.push('\n');

        tokio::fs::write(&self.dhcpd_conf, conf)
            .await
            .with_context(|| format!("Failed to write {}", self.dhcpd_conf.display()))
    }

    async fn remove_include(&self, file: &Path) -> Result<()> {
        let needle = file.to_string_lossy();
        let conf = self.read_dhcpd_conf().await?;
        if !conf.lines().any(|l| l.contains(needle.as_ref())) {
            return Ok(());
        }

        let mut kept: String = conf
            .lines()
            .filter(|l| !l.contains(needle.as_ref()))
            .collect::<Vec<_>>()
            .join("\n");
        if !kept.is_empty() {
            kept.push('\n');
        }
        tokio::fs::write(&self.dhcpd_conf, kept)
            .await
            .with_context(|| format!("Failed to write {}", self.dhcpd_conf.display()))
    }
}

fn include_line(file: &Path) -> String {
    format!("include \"{}\";", file.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::ranges::tests::{endpoint, pool};
    use crate::models::PoolType;
    use chrono::Utc;

    fn netgw() -> NetGw {
        NetGw {
            id: 1,
            hostname: "cmts-1".to_string(),
            ip: "10.255.0.1".to_string(),
            pool_count: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn writer(dir: &Path) -> DhcpConfigWriter {
        DhcpConfigWriter::new(dir.join("netgws"), dir.join("dhcpd.conf"))
    }

    #[test]
    fn test_render_shared_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut cm = pool(PoolType::Cm, "10.0.0.10", "10.0.0.200");
        cm.id = 1;
        let mut public = pool(PoolType::CpePub, "10.0.0.201", "10.0.0.210");
        public.id = 2;
        let endpoints = vec![endpoint("10.0.0.205", true)];

        let out = writer(dir.path()).render(&netgw(), &[cm, public], &endpoints).unwrap();

        assert!(out.starts_with("shared-network \"cmts-1\"\n{\n\tsubnet 10.0.0.0 netmask 255.255.255.0\n"));
        assert!(out.contains("\t\toption routers 10.0.0.1;\n"));
        assert!(out.contains("\t\toption broadcast-address 10.0.0.255;\n"));
        assert!(out.contains("\t\t\trange 10.0.0.10 10.0.0.200;\n\t\t\tallow members of \"CM\";\n"));
        assert!(out.contains("\t\t\trange 10.0.0.201 10.0.0.204;\n\t\t\trange 10.0.0.206 10.0.0.210;\n"));
        assert!(out.contains("\t\t\tallow members of \"Client\";\n\t\t\tdeny members of \"Client-Public\";\n"));
        assert!(out.contains("subnet 10.0.0.0 netmask 255.255.255.0 # secondary"));
        assert!(out.ends_with("\t}\n}\n"));
    }

    #[test]
    fn test_render_skips_v6_pools() {
        let dir = tempfile::tempdir().unwrap();
        let mut v6 = pool(PoolType::Cm, "2001:db8::10", "2001:db8::ff");
        v6.version = 6;
        let out = writer(dir.path()).render(&netgw(), &[v6], &[]).unwrap();
        assert_eq!(out, "shared-network \"cmts-1\"\n{\n}\n");
    }

    #[test]
    fn test_render_cidr_netmask_as_dotted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cm = pool(PoolType::Cm, "10.0.0.10", "10.0.0.200");
        cm.netmask = "/24".to_string();

        let out = writer(dir.path()).render(&netgw(), &[cm], &[]).unwrap();
        assert!(out.contains("\tsubnet 10.0.0.0 netmask 255.255.255.0\n"));
        assert!(!out.contains("netmask /24"));
    }

    #[test]
    fn test_render_fully_reserved_pool_has_no_pool_block() {
        let dir = tempfile::tempdir().unwrap();
        let public = pool(PoolType::CpePub, "10.0.0.201", "10.0.0.202");
        let endpoints = vec![endpoint("10.0.0.201", true), endpoint("10.0.0.202", true)];

        let out = writer(dir.path()).render(&netgw(), &[public], &endpoints).unwrap();
        assert!(!out.contains("pool"));
        assert!(!out.contains("range"));
        assert!(out.contains("\t\toption broadcast-address 10.0.0.255;\n\t}\n}\n"));
    }

    #[tokio::test]
    async fn test_write_fails_when_dhcpd_conf_dir_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the dhcpd.conf directory should be
        std::fs::write(dir.path().join("etc"), "").unwrap();
        let w = DhcpConfigWriter::new(dir.path().join("netgws"), dir.path().join("etc").join("dhcpd.conf"));

        let err = w.write(&netgw(), &[], &[]).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to create"));
    }

    #[tokio::test]
    async fn test_write_and_remove_manage_include() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        std::fs::write(dir.path().join("dhcpd.conf"), "authoritative;").unwrap();

        let (path, _) = w.write(&netgw(), &[pool(PoolType::Cm, "10.0.0.10", "10.0.0.20")], &[]).await.unwrap();
        assert!(path.exists());
        // writing twice must not duplicate the include
        w.write(&netgw(), &[], &[]).await.unwrap();

        let conf = std::fs::read_to_string(dir.path().join("dhcpd.conf")).unwrap();
        assert_eq!(conf, format!("authoritative;\n{}\n", include_line(&path)));

        w.remove("cmts-1").await.unwrap();
        assert!(!path.exists());
        let conf = std::fs::read_to_string(dir.path().join("dhcpd.conf")).unwrap();
        assert_eq!(conf, "authoritative;\n");
    }
}
