//! Observer tree tests on an in-memory document, end to end through the relay.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use common::{of_type, RecordingHost};
use mediascope::config::{Config, ExtensionConfig};
use mediascope::dom::{Dom, DomEvent, MemoryDom};
use mediascope::page::{PageAggregator, PageController, PageProperty};
use mediascope::protocol::{BrowserEvent, Envelope, Tab, TabId};
use mediascope::relay::{HostEndpoint, PagePort, RelayCoordinator, TabRegistry};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn pump(page: &mut PageAggregator, events: &mut mpsc::UnboundedReceiver<DomEvent>) {
    while let Ok(event) = events.try_recv() {
        page.handle_dom_event(event);
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn video_playback_reaches_the_host() {
        let registry = Arc::new(TabRegistry::new());
        let tab = TabId(1);
        let page_events = registry.open(
            tab,
            Tab {
                url: Some("https://example.com/watch".to_string()),
                title: Some("Watch".to_string()),
                ..Default::default()
            },
        );
        let host = Arc::new(RecordingHost::silent("com.example.sink"));
        let endpoint: Arc<dyn HostEndpoint> = host.clone();
        let (coordinator, batches) = RelayCoordinator::new(registry.clone(), vec![endpoint], ms(20));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (browser_tx, browser_rx) = mpsc::unbounded_channel::<BrowserEvent>();
        let relay = tokio::spawn(coordinator.run(batches, request_rx, browser_rx));

        let (dom, dom_events) = MemoryDom::new("https://example.com/watch");
        let dom = Arc::new(dom);
        let controller = PageController::new(
            dom.clone(),
            PagePort::new(Some(tab), request_tx),
            &Config::default(),
        );
        let page = tokio::spawn(controller.run(dom_events, page_events));

        tokio::time::sleep(ms(100)).await;
        let video = dom.append_element(dom.document(), "video");
        tokio::time::sleep(ms(100)).await;
        dom.play(video);
        tokio::time::sleep(ms(100)).await;

        registry.close(tab);
        page.await.unwrap();
        drop(browser_tx);
        relay.await.unwrap();

        let messages = host.messages();
        let videos = of_type(&messages, "web-video-element");
        assert!(videos.len() >= 2);
        assert_eq!(videos[0]["playing"], json!(false));
        assert!(videos[1..].iter().any(|m| m["playing"] == json!(true)));

        let pages = of_type(&messages, "web-page");
        assert_eq!(pages[0]["url"], json!("https://example.com/watch"));
        assert_eq!(pages[0]["tabId"], json!(1));
        assert!(pages.iter().any(|m| m["audible"] == json!(true)));
        assert_eq!(videos[0]["pageId"], pages[0]["id"]);
        assert_eq!(pages.last().unwrap()["disposed"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn host_rotation_replaces_the_page() {
        let registry = Arc::new(TabRegistry::new());
        let tab = TabId(2);
        let page_events = registry.open(tab, Tab::default());
        let host = Arc::new(RecordingHost::replying("com.example.sink", &["session-1"]));
        let endpoint: Arc<dyn HostEndpoint> = host.clone();
        let (coordinator, batches) = RelayCoordinator::new(registry.clone(), vec![endpoint], ms(20));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (browser_tx, browser_rx) = mpsc::unbounded_channel::<BrowserEvent>();
        let relay = tokio::spawn(coordinator.run(batches, request_rx, browser_rx));

        let (dom, dom_events) = MemoryDom::new("https://example.com/");
        let dom = Arc::new(dom);
        let controller = PageController::new(
            dom.clone(),
            PagePort::new(Some(tab), request_tx),
            &Config::default(),
        );
        let page = tokio::spawn(controller.run(dom_events, page_events));

        tokio::time::sleep(ms(200)).await;
        registry.close(tab);
        page.await.unwrap();
        drop(browser_tx);
        relay.await.unwrap();

        let messages = host.messages();
        let pages = of_type(&messages, "web-page");
        let first_id = pages[0]["id"].clone();
        let replacement = pages
            .iter()
            .position(|m| m["id"] != first_id)
            .expect("a second page after the rotation");

        // The old page is reported disposed before the new page appears.
        assert!(pages[..replacement]
            .iter()
            .any(|m| m["id"] == first_id && m["disposed"] == json!(true)));
        assert_eq!(pages[replacement]["disposed"], json!(false));
        // One rotation only: the reply stays the same afterwards.
        let ids: std::collections::HashSet<_> = pages.iter().map(|m| m["id"].clone()).collect();
        assert_eq!(ids.len(), 2);
    }
}

mod tree {
    use super::*;

    fn page(dom: &Arc<MemoryDom>) -> (PageAggregator, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let page = PageAggregator::new(dom.clone(), Arc::new(tx), ms(20), ExtensionConfig::default());
        (page, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn nested_frames_are_observed_and_released() {
        let (dom, mut events) = MemoryDom::new("https://example.com/");
        let dom = Arc::new(dom);
        let body = dom.append_element(dom.document(), "body");
        let outer = dom.append_element(body, "iframe");
        let outer_doc = dom.load_frame(outer).unwrap();
        let clip = dom.append_element(outer_doc, "audio");
        let inner = dom.append_element(outer_doc, "iframe");

        let (mut page, _rx) = page(&dom);
        page.init();
        pump(&mut page, &mut events);
        assert_eq!(page.observed_nodes(), vec![clip]);
        assert_eq!(page.frame_documents(), vec![outer_doc]);

        // The inner frame loads after init.
        let inner_doc = dom.load_frame(inner).unwrap();
        pump(&mut page, &mut events);
        let movie = dom.append_element(inner_doc, "video");
        let script = dom.append_element(inner_doc, "script");
        pump(&mut page, &mut events);
        assert_eq!(page.observed_nodes(), vec![clip, movie, script]);
        assert_eq!(page.video_count(), 1);
        assert_eq!(page.script_count(), 1);

        // Dropping the outer frame takes everything below it along.
        dom.remove(outer);
        pump(&mut page, &mut events);
        assert!(page.observed_nodes().is_empty());
        assert!(page.frame_documents().is_empty());
        assert_eq!(dom.watch_count(), 1);

        page.dispose();
        assert_eq!(dom.watch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn moved_node_keeps_a_single_observer() {
        let (dom, mut events) = MemoryDom::new("https://example.com/");
        let dom = Arc::new(dom);
        let left = dom.append_element(dom.document(), "div");
        let right = dom.append_element(dom.document(), "div");
        let clip = dom.append_element(left, "audio");

        let (mut page, _rx) = page(&dom);
        page.init();
        dom.append_child(right, clip);
        pump(&mut page, &mut events);

        assert_eq!(page.audio_count(), 1);
        // Page subtree watch plus the eight playback watches of one observer.
        assert_eq!(dom.watch_count(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn audibility_is_never_cleared_by_media() {
        let (dom, mut events) = MemoryDom::new("https://example.com/");
        let dom = Arc::new(dom);
        let clip = dom.append_element(dom.document(), "audio");
        let (mut page, _rx) = page(&dom);
        page.init();

        dom.play(clip);
        pump(&mut page, &mut events);
        assert_eq!(page.property(PageProperty::Audible), Some(&json!(true)));

        dom.end(clip);
        dom.remove(clip);
        pump(&mut page, &mut events);
        assert_eq!(page.property(PageProperty::Audible), Some(&json!(true)));
    }
}
