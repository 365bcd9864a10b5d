use super::*;
use std::sync::Mutex;

use proptest::prelude::*;
use serde_json::json;

/// Page source that replays a fixed script, one entry per page.
struct ScriptedSource {
    pages: Vec<Result<usize, u16>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    /// `Ok(n)` serves `n` records, `Err(status)` fails with that status.
    /// Pages past the end of the script are empty.
    fn new(pages: Vec<Result<usize, u16>>) -> Self {
        Self {
            pages,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch(&self, request: PageRequest) -> Result<Vec<RawRecord>, PageError> {
        self.requests.lock().unwrap().push(request);
        match self.pages.get(request.page as usize) {
            Some(Ok(n)) => Ok((0..*n).map(|i| record(request.page, i)).collect()),
            Some(Err(status)) => Err(PageError::Status { status: *status }),
            None => Ok(Vec::new()),
        }
    }
}

fn record(page: u32, i: usize) -> RawRecord {
    match json!({"codigo_documento": format!("doc-{}-{}", page, i), "pagina": page}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn config(max_pages: u32) -> HarvestConfig {
    HarvestConfig {
        page_size: 1000,
        max_pages,
        delay_ms: 0,
        ..HarvestConfig::default()
    }
}

#[tokio::test]
async fn test_stops_at_empty_page() {
    let source = ScriptedSource::new(vec![Ok(1000), Ok(1000), Ok(0)]);
    let harvester = Harvester::new(source, &config(3));

    let harvest = harvester.harvest().await;

    assert_eq!(harvest.records.len(), 2000);
    assert_eq!(harvest.pages, 2);
    assert!(matches!(harvest.stop, StopReason::EmptyPage { page: 2 }));
    assert!(!harvest.is_partial());
}

#[tokio::test]
async fn test_stops_at_failed_page_and_keeps_earlier_records() {
    let source = ScriptedSource::new(vec![Ok(10), Err(503), Ok(10)]);
    let harvester = Harvester::new(source, &config(5));

    let harvest = harvester.harvest().await;

    assert_eq!(harvest.records.len(), 10);
    assert!(harvest.is_partial());
    assert!(matches!(
        harvest.stop,
        StopReason::Failed {
            page: 1,
            error: PageError::Status { status: 503 }
        }
    ));
    assert_eq!(harvester.source.requests().len(), 2);
}

#[tokio::test]
async fn test_stops_at_page_ceiling() {
    let source = ScriptedSource::new(vec![Ok(5); 10]);
    let harvester = Harvester::new(source, &config(4));

    let harvest = harvester.harvest().await;

    assert_eq!(harvest.records.len(), 20);
    assert_eq!(harvest.pages, 4);
    assert!(matches!(harvest.stop, StopReason::MaxPages));
    assert_eq!(harvester.source.requests().len(), 4);
}

#[tokio::test]
async fn test_zero_max_pages_requests_nothing() {
    let source = ScriptedSource::new(vec![Ok(5)]);
    let harvester = Harvester::new(source, &config(0));

    let harvest = harvester.harvest().await;

    assert!(harvest.records.is_empty());
    assert!(harvester.source.requests().is_empty());
}

#[tokio::test]
async fn test_records_keep_page_order() {
    let source = ScriptedSource::new(vec![Ok(2), Ok(2)]);
    let harvester = Harvester::new(source, &config(2));

    let harvest = harvester.harvest().await;

    let ids: Vec<&str> = harvest
        .records
        .iter()
        .map(|r| r["codigo_documento"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["doc-0-0", "doc-0-1", "doc-1-0", "doc-1-1"]);
}

#[tokio::test]
async fn test_page_offset_unit() {
    let source = ScriptedSource::new(vec![Ok(1); 3]);
    let harvester = Harvester::new(source, &config(3));
    harvester.harvest().await;

    let offsets: Vec<u64> = harvester.source.requests().iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert!(harvester.source.requests().iter().all(|r| r.limit == 1000));
}

#[tokio::test]
async fn test_record_offset_unit() {
    let source = ScriptedSource::new(vec![Ok(1); 3]);
    let cfg = HarvestConfig {
        offset_unit: OffsetUnit::Record,
        ..config(3)
    };
    let harvester = Harvester::new(source, &cfg);
    harvester.harvest().await;

    let offsets: Vec<u64> = harvester.source.requests().iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 1000, 2000]);
}

#[tokio::test(start_paused = true)]
async fn test_delay_between_requests() {
    let source = ScriptedSource::new(vec![Ok(1), Ok(1), Ok(0)]);
    let cfg = HarvestConfig {
        delay_ms: 1000,
        ..config(3)
    };
    let harvester = Harvester::new(source, &cfg);

    let started = tokio::time::Instant::now();
    harvester.harvest().await;

    // Three requests, two gaps.
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_harvest_and_save_writes_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("doses.json");
    let source = ScriptedSource::new(vec![Ok(1000), Ok(1000), Ok(0)]);
    let harvester = Harvester::new(source, &config(3));

    let harvest = harvester.harvest_and_save(&path).await.unwrap();

    let saved: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(harvest.records.len(), 2000);
    assert_eq!(saved.len(), 2000);
}

#[test]
fn test_stop_reason_display() {
    assert_eq!(
        StopReason::EmptyPage { page: 4 }.to_string(),
        "page 4 was empty"
    );
    assert_eq!(
        StopReason::Failed {
            page: 1,
            error: PageError::Status { status: 500 }
        }
        .to_string(),
        "page 1 failed: HTTP status 500"
    );
}

fn arb_page() -> impl Strategy<Value = Result<usize, u16>> {
    prop_oneof![
        4 => (0usize..6).prop_map(Ok),
        1 => prop_oneof![Just(404u16), Just(500u16), Just(503u16)].prop_map(Err),
    ]
}

proptest! {
    #[test]
    fn prop_harvest_stops_at_first_empty_or_failed_page(
        pages in prop::collection::vec(arb_page(), 0..8),
        max_pages in 0u32..10,
    ) {
        let harvester = Harvester::new(ScriptedSource::new(pages.clone()), &config(max_pages));
        let harvest = tokio_test::block_on(harvester.harvest());

        // Pages beyond the script are empty.
        let served: Vec<Result<usize, u16>> = (0..max_pages as usize)
            .map(|i| pages.get(i).cloned().unwrap_or(Ok(0)))
            .collect();
        let stop_at = served
            .iter()
            .position(|p| !matches!(p, Ok(n) if *n > 0));
        let expected: usize = served[..stop_at.unwrap_or(served.len())]
            .iter()
            .map(|p| *p.as_ref().unwrap())
            .sum();

        prop_assert_eq!(harvest.records.len(), expected);
        prop_assert_eq!(
            harvester.source.requests().len(),
            stop_at.map(|i| i + 1).unwrap_or(served.len())
        );
    }
}
