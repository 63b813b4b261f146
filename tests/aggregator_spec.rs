use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use tabdeck::aggregator::{AggregationOutcome, ColorAggregator};
use tabdeck::host::memory::MemoryHost;
use tabdeck::host::EntityHost;
use tabdeck::models::{EntityId, Namespace};
use tabdeck::store::PersistentStore;

fn png(pixel: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(4, 4, Rgba(pixel));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes.into_inner()
}

struct Fixture {
    host: MemoryHost,
    store: PersistentStore,
    aggregator: ColorAggregator,
    group: EntityId,
}

fn fixture() -> Fixture {
    let host = MemoryHost::new();
    let group = host.add_group("g1", "Work");
    let store = PersistentStore::open_memory();
    let aggregator = ColorAggregator::new(Arc::new(host.clone()), Arc::new(host.clone()), store.clone());
    Fixture {
        host,
        store,
        aggregator,
        group,
    }
}

impl Fixture {
    fn saved_color(&self) -> Option<String> {
        self.store.get(Namespace::Colors).get(self.group.as_str()).cloned()
    }

    fn color(&self) -> Option<String> {
        self.host.entity(&self.group).and_then(|e| e.color)
    }
}

mod exactly_once {
    use super::*;

    #[tokio::test]
    async fn no_sources_does_nothing() {
        let f = fixture();

        assert_eq!(f.aggregator.run(&f.group).await, AggregationOutcome::NoSources);
        assert_eq!(f.host.color_writes(&f.group), 0);
        assert_eq!(f.saved_color(), None);
    }

    #[tokio::test]
    async fn all_failed_sources_do_nothing() {
        let f = fixture();
        f.host.add_tab(&f.group, "t1", Some("https://a.test/favicon.ico"));
        f.host.add_tab(&f.group, "t2", None);
        f.host.add_image("https://b.test/favicon.png", b"garbage".to_vec());
        f.host.add_tab(&f.group, "t3", Some("https://b.test/favicon.png"));

        assert_eq!(
            f.aggregator.run(&f.group).await,
            AggregationOutcome::NoSamples { sources: 3 }
        );
        assert_eq!(f.host.color_writes(&f.group), 0);
        assert_eq!(f.saved_color(), None);
        assert_eq!(f.host.image_loads(), 2);
    }

    #[tokio::test]
    async fn mixed_sources_apply_once() {
        let f = fixture();
        f.host.add_image("https://a.test/icon.png", png([10, 20, 30, 255]));
        f.host.add_image("https://b.test/icon.png", png([30, 40, 50, 255]));
        f.host.add_tab(&f.group, "t1", Some("https://a.test/icon.png"));
        f.host.add_tab(&f.group, "t2", Some("https://missing.test/icon.png"));
        f.host.add_tab(&f.group, "t3", Some("https://b.test/icon.png"));
        f.host.add_tab(&f.group, "t4", None);

        let outcome = f.aggregator.run(&f.group).await;

        assert_eq!(
            outcome,
            AggregationOutcome::Applied {
                color: "rgb(20, 30, 40)".to_string(),
                sources: 4,
                samples: 2,
            }
        );
        assert_eq!(f.host.color_writes(&f.group), 1);
        assert_eq!(f.color().as_deref(), Some("rgb(20, 30, 40)"));
        assert_eq!(f.saved_color().as_deref(), Some("rgb(20, 30, 40)"));
    }

    #[tokio::test]
    async fn all_successful_sources_apply_once() {
        let f = fixture();
        f.host.add_image("https://a.test/icon.png", png([200, 0, 0, 255]));
        for i in 0..5 {
            f.host.add_tab(&f.group, &format!("t{i}"), Some("https://a.test/icon.png"));
        }

        let outcome = f.aggregator.run(&f.group).await;

        assert!(matches!(outcome, AggregationOutcome::Applied { samples: 5, .. }));
        assert_eq!(f.host.color_writes(&f.group), 1);
        assert_eq!(f.color().as_deref(), Some("rgb(200, 0, 0)"));
    }
}

mod filtering {
    use super::*;

    #[tokio::test]
    async fn transparent_and_black_favicons_yield_no_sample() {
        let f = fixture();
        f.host.add_image("https://a.test/clear.png", png([255, 255, 255, 0]));
        f.host.add_image("https://a.test/black.png", png([0, 0, 0, 255]));
        f.host.add_tab(&f.group, "t1", Some("https://a.test/clear.png"));
        f.host.add_tab(&f.group, "t2", Some("https://a.test/black.png"));

        assert_eq!(
            f.aggregator.run(&f.group).await,
            AggregationOutcome::NoSamples { sources: 2 }
        );
        assert_eq!(f.color(), None);
    }
}

mod reruns {
    use super::*;

    #[tokio::test]
    async fn later_run_overwrites_earlier_result() {
        let f = fixture();
        f.host.add_image("https://a.test/red.png", png([200, 0, 0, 255]));
        f.host.add_image("https://a.test/blue.png", png([0, 0, 200, 255]));
        f.host.add_tab(&f.group, "t1", Some("https://a.test/red.png"));
        f.aggregator.run(&f.group).await;

        f.host.add_tab(&f.group, "t2", Some("https://a.test/blue.png"));
        let first = f.aggregator.spawn(f.group.clone());
        let second = f.aggregator.spawn(f.group.clone());
        first.await.expect("job panicked");
        second.await.expect("job panicked");

        assert_eq!(f.saved_color().as_deref(), Some("rgb(100, 0, 100)"));
        assert_eq!(f.host.color_writes(&f.group), 3);
    }

    #[tokio::test]
    async fn vanished_group_is_not_saved() {
        let f = fixture();
        f.host.add_image("https://a.test/red.png", png([200, 0, 0, 255]));
        f.host.add_tab(&f.group, "t1", Some("https://a.test/red.png"));
        let job = f.aggregator.spawn(f.group.clone());
        f.host.remove_entity(&f.group);

        // members were read before removal or the job saw no sources
        let outcome = job.await.expect("job panicked");
        assert!(matches!(
            outcome,
            AggregationOutcome::EntityGone { .. } | AggregationOutcome::NoSources
        ));
        assert_eq!(f.saved_color(), None);
    }
}
