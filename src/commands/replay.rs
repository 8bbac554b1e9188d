use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::mpsc;

use crate::cli::Cli;
use mediascope::config::Config;
use mediascope::dom::MemoryDom;
use mediascope::error::{MediascopeError, Result};
use mediascope::page::PageController;
use mediascope::protocol::BrowserEvent;
use mediascope::relay::{HostEndpoint, NativeHost, PagePort, RelayCoordinator, StdoutHost, TabRegistry};
use mediascope::scenario::{Effect, Scenario, Stage};

const ANNOUNCEMENT: &str = "Mediascope media observation relay";

pub async fn run(cli: &Cli, path: &Path, stdout: bool) -> Result<()> {
    let config = Config::load()?;
    let scenario = Scenario::load(path)?;
    let hosts = resolve_hosts(&config, stdout);
    let tab = scenario.tab();

    let registry = Arc::new(TabRegistry::new());
    let page_events = registry.open(tab, scenario.tab_record());

    let (mut coordinator, batches) =
        RelayCoordinator::new(registry.clone(), hosts, config.relay.flush_delay());
    coordinator.announce(ANNOUNCEMENT);
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (browser_tx, browser_rx) = mpsc::unbounded_channel();
    let coordinator_task = tokio::spawn(coordinator.run(batches, request_rx, browser_rx));

    let (dom, dom_events) = MemoryDom::new(&scenario.url);
    let dom = Arc::new(dom);
    let controller = PageController::new(dom.clone(), PagePort::new(Some(tab), request_tx), &config);
    let page_task = tokio::spawn(controller.run(dom_events, page_events));

    let mut stage = Stage::new(dom);
    for (index, step) in scenario.steps.iter().enumerate() {
        let effect = stage.apply(step).map_err(|e| {
            MediascopeError::ScenarioError(format!("step {}: {}", index + 1, e))
        })?;
        match effect {
            Effect::None => {}
            Effect::Wait(duration) => tokio::time::sleep(duration).await,
            Effect::Activate(target) => {
                notify(&browser_tx, BrowserEvent::TabActivated(target.unwrap_or(tab)));
            }
            Effect::UpdateTab(change) => {
                registry.update(tab, &change);
                notify(&browser_tx, BrowserEvent::TabUpdated(tab, change));
            }
        }
        tokio::task::yield_now().await;
    }

    // Let trailing flushes from both debounce stages land.
    tokio::time::sleep(config.observer.flush_delay() + config.relay.flush_delay()).await;

    registry.close(tab);
    page_task
        .await
        .map_err(|e| MediascopeError::Other(format!("Page task failed: {}", e)))?;
    notify(&browser_tx, BrowserEvent::TabRemoved(tab));
    drop(browser_tx);
    let delivered = coordinator_task
        .await
        .map_err(|e| MediascopeError::Other(format!("Coordinator task failed: {}", e)))?;

    if stdout {
        return Ok(());
    }
    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "scenario": path.display().to_string(),
                "steps": scenario.steps.len(),
                "batches": delivered,
            })
        );
    } else {
        println!(
            "  {} Replayed {} step(s), delivered {} batch(es)",
            "✓".green(),
            scenario.steps.len(),
            delivered
        );
    }

    Ok(())
}

fn notify(browser_tx: &mpsc::UnboundedSender<BrowserEvent>, event: BrowserEvent) {
    if let Err(e) = browser_tx.send(event) {
        tracing::trace!("Coordinator gone; dropped {:?}", e.0);
    }
}

/// Hosts that can actually be launched. Unresolvable ones are skipped.
fn resolve_hosts(config: &Config, stdout: bool) -> Vec<Arc<dyn HostEndpoint>> {
    if stdout {
        return vec![Arc::new(StdoutHost)];
    }
    config
        .relay
        .hosts
        .iter()
        .filter_map(|host| match NativeHost::resolve(host, &config.extension.id) {
            Ok(endpoint) => Some(Arc::new(endpoint) as Arc<dyn HostEndpoint>),
            Err(e) => {
                tracing::warn!("Skipping host {}: {}", host.name, e);
                None
            }
        })
        .collect()
}
