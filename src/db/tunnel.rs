// SSH Tunnel Capability
// Sessions and cancellable queries reach tunneled servers through a
// forwarded local endpoint supplied by a TunnelProvider

use crate::db::config::ConnectionConfig;
use crate::db::traits::DatabaseError;
use tracing::warn;

/// A running port forward. `stop` is called exactly once at teardown.
pub trait TunnelHandle: Send + Sync {
    fn stop(&mut self) -> Result<(), DatabaseError>;
}

/// Where to connect after tunneling: the forwarded local endpoint when a
/// tunnel was started, otherwise the configured server. A tunnel still held
/// by the endpoint is stopped when it drops.
pub struct TunnelEndpoint {
    pub handle: Option<Box<dyn TunnelHandle>>,
    pub host: String,
    pub port: Option<u16>,
}

impl TunnelEndpoint {
    pub fn direct(config: &ConnectionConfig) -> Self {
        Self {
            handle: None,
            host: config.server().to_string(),
            port: config.port(),
        }
    }

    pub fn is_tunneled(&self) -> bool {
        self.handle.is_some()
    }

    /// Config to hand to the adapter's connect. A running tunnel must
    /// report its local port.
    pub fn connect_config(&self, config: &ConnectionConfig) -> Result<ConnectionConfig, DatabaseError> {
        match (&self.handle, self.port) {
            (Some(_), Some(port)) => Ok(config.with_endpoint(&self.host, port)),
            (Some(_), None) => Err(DatabaseError::Tunnel(format!(
                "SSH tunnel to {} did not report a local port",
                config.server()
            ))),
            (None, _) => Ok(config.clone()),
        }
    }

    /// Hands the running tunnel to the caller, who then owns its teardown
    pub fn take_handle(&mut self) -> Option<Box<dyn TunnelHandle>> {
        self.handle.take()
    }
}

impl Drop for TunnelEndpoint {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            stop_tunnel(handle);
        }
    }
}

impl std::fmt::Debug for TunnelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelEndpoint")
            .field("tunneled", &self.handle.is_some())
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Starts SSH port forwards for configs that request one
#[async_trait::async_trait]
pub trait TunnelProvider: Send + Sync {
    async fn create_tunnel(&self, config: &ConnectionConfig) -> Result<TunnelEndpoint, DatabaseError>;
}

/// Provider for builds without SSH support. Configs without a tunnel pass
/// through; configs that request one are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTunnels;

#[async_trait::async_trait]
impl TunnelProvider for DirectTunnels {
    async fn create_tunnel(&self, config: &ConnectionConfig) -> Result<TunnelEndpoint, DatabaseError> {
        if let Some(tunnel) = config.tunnel.as_ref().filter(|_| config.requires_tunnel()) {
            return Err(DatabaseError::Tunnel(format!(
                "no SSH tunnel provider configured for {}@{}:{}",
                tunnel.username, tunnel.host, tunnel.port
            )));
        }
        Ok(TunnelEndpoint::direct(config))
    }
}

/// Stops a tunnel, logging instead of propagating a failure
pub(crate) fn stop_tunnel(mut handle: Box<dyn TunnelHandle>) {
    if let Err(e) = handle.stop() {
        warn!(error = %e, "Failed to stop SSH tunnel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::bastion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandle(Arc<AtomicUsize>);

    impl TunnelHandle for CountingHandle {
        fn stop(&mut self) -> Result<(), DatabaseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn forwarded(stops: &Arc<AtomicUsize>, port: Option<u16>) -> TunnelEndpoint {
        TunnelEndpoint {
            handle: Some(Box::new(CountingHandle(stops.clone()))),
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn test_direct_passthrough() {
        let config = ConnectionConfig::tcp("db", "postgresql", "db.local", Some(5433), "app", "u", "p");
        let endpoint = DirectTunnels.create_tunnel(&config).await.unwrap();
        assert!(endpoint.handle.is_none());
        assert_eq!(endpoint.host, "db.local");
        assert_eq!(endpoint.port, Some(5433));
        assert_eq!(endpoint.connect_config(&config).unwrap(), config);
    }

    #[tokio::test]
    async fn test_direct_rejects_tunnel_request() {
        let config = ConnectionConfig::tcp("db", "postgresql", "db.local", None, "app", "u", "p")
            .with_tunnel(bastion());
        let err = DirectTunnels.create_tunnel(&config).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Tunnel(msg) if msg.contains("bastion")));
    }

    #[tokio::test]
    async fn test_file_configs_ignore_tunnel() {
        let config = ConnectionConfig::file("local", "sqlite", "/tmp/x.db").with_tunnel(bastion());
        assert!(DirectTunnels.create_tunnel(&config).await.is_ok());
    }

    #[test]
    fn test_unclaimed_tunnel_stops_on_drop() {
        let stops = Arc::new(AtomicUsize::new(0));
        drop(forwarded(&stops, Some(40000)));
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let mut endpoint = forwarded(&stops, Some(40000));
        let handle = endpoint.take_handle();
        drop(endpoint);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        stop_tunnel(handle.unwrap());
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tunnel_without_local_port_is_rejected() {
        let config = ConnectionConfig::tcp("db", "postgresql", "db.remote", Some(5432), "app", "u", "p")
            .with_tunnel(bastion());
        let stops = Arc::new(AtomicUsize::new(0));
        let endpoint = forwarded(&stops, None);
        let err = endpoint.connect_config(&config).unwrap_err();
        assert!(matches!(err, DatabaseError::Tunnel(msg) if msg.contains("db.remote")));

        let routed = forwarded(&stops, Some(40000)).connect_config(&config).unwrap();
        assert_eq!((routed.server(), routed.port()), ("127.0.0.1", Some(40000)));
    }
}
