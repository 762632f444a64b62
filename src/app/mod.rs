//! Application Layer
//!
//! - Forwarder: local listeners relayed through the router
//! - App: builds the router from configuration and runs every forwarder

mod forwarder;

pub use forwarder::{relay, Forwarder};

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Result;
use crate::registry::Registry;
use crate::router::Router;

/// Configured forwarders sharing one router
pub struct App {
    router: Arc<Router>,
    forwarders: Vec<Arc<Forwarder>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl App {
    pub fn from_config(config: &Config, registry: &Registry) -> Result<Self> {
        let router = Arc::new(config.build_router(registry)?);
        let forwarders = config
            .forwarders
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let name = if f.name.is_empty() {
                    format!("forward-{}", i)
                } else {
                    f.name.clone()
                };
                Arc::new(Forwarder::new(name, &f.listen, &f.target, router.clone()))
            })
            .collect();
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            router,
            forwarders,
            shutdown_tx,
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn forwarders(&self) -> &[Arc<Forwarder>] {
        &self.forwarders
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();
        for forwarder in &self.forwarders {
            let forwarder = forwarder.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let name = forwarder.name().to_string();
                if let Err(e) = forwarder.run(shutdown_rx).await {
                    error!("[{}] Forwarder error: {}", name, e);
                }
            }));
        }
        info!("Started {} forwarder(s)", self.forwarders.len());

        tokio::signal::ctrl_c().await?;
        info!("Shutting down...");

        let _ = self.shutdown_tx.send(());
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForwarderConfig;

    #[test]
    fn test_from_config() {
        let mut config = Config::example();
        config.forwarders.push(ForwarderConfig {
            name: String::new(),
            listen: "127.0.0.1:0".to_string(),
            target: "example.org:80".to_string(),
        });
        let app = App::from_config(&config, &Registry::with_defaults()).unwrap();
        let names: Vec<&str> = app.forwarders().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["ssh", "forward-1"]);
        assert_eq!(app.forwarders()[1].target(), "example.org:80");
        assert_eq!(app.router().options().retries, 2);
    }
}
