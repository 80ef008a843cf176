use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectra::error::{Result, VectraError};
use vectra::vector::search::hybrid::{AllowList, HybridSearchRequest};
use vectra::vector::{DistanceMetric, HnswIndex, HnswIndexConfig};

/// Points `(i, 0)` for `i` in `0..count`, id `i`.
fn line_index(count: u64) -> Result<HnswIndex> {
    let config = HnswIndexConfig::new(2)
        .with_m(8)
        .with_distance_metric(DistanceMetric::Euclidean)
        .with_seed(9);
    let index = HnswIndex::new(config)?;
    for i in 0..count {
        index.insert(i, &[i as f32, 0.0])?;
    }
    Ok(index)
}

#[test]
fn test_threshold_never_exceeded() -> Result<()> {
    let config = HnswIndexConfig::new(4)
        .with_distance_metric(DistanceMetric::Euclidean)
        .with_seed(1);
    let index = HnswIndex::new(config)?;
    let mut rng = StdRng::seed_from_u64(2);
    for id in 0..300 {
        let v: Vec<f32> = (0..4).map(|_| rng.random::<f32>()).collect();
        index.insert(id, &v)?;
    }

    for _ in 0..20 {
        let query: Vec<f32> = (0..4).map(|_| rng.random::<f32>()).collect();
        let request = HybridSearchRequest::new(query, 50).with_distance_threshold(0.5);
        let hits = index.hybrid_search(&request, None)?;
        assert!(hits.len() <= 50);
        assert!(hits.iter().all(|h| h.distance <= 0.5));
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }
    Ok(())
}

#[test]
fn test_threshold_on_line() -> Result<()> {
    let index = line_index(50)?;
    let request = HybridSearchRequest::new(vec![10.0, 0.0], 10)
        .with_ef(50)
        .with_distance_threshold(2.0);

    let hits = index.hybrid_search(&request, None)?;
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![10, 9, 11, 8, 12]);
    Ok(())
}

#[test]
fn test_predicate_filter() -> Result<()> {
    let index = line_index(100)?;
    let even = |id: u64| id % 2 == 0;
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 5).with_ef(100);

    let hits = index.hybrid_search(&request, Some(&even))?;
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![0, 2, 4, 6, 8]);
    Ok(())
}

#[test]
fn test_retry_widens_fetch() -> Result<()> {
    let index = line_index(100)?;
    // First pass fetches 2 * 4 = 8 candidates, all rejected; the retry
    // fetches 16 and reaches ids 12 and 13.
    let allowed: AllowList = [12, 13, 90].into_iter().collect();
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 2)
        .with_ef(100)
        .with_overfetch_factor(4);

    let hits = index.hybrid_search(&request, Some(&allowed))?;
    let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![12, 13]);
    Ok(())
}

#[test]
fn test_short_result_after_single_retry() -> Result<()> {
    let index = line_index(100)?;
    let calls = AtomicUsize::new(0);
    let far_only = |id: u64| {
        calls.fetch_add(1, Ordering::Relaxed);
        id >= 90
    };
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 3)
        .with_ef(100)
        .with_overfetch_factor(2);

    // Fetches 6 then 12; nothing at or beyond 90 is reached.
    let hits = index.hybrid_search(&request, Some(&far_only))?;
    assert!(hits.is_empty());
    assert_eq!(calls.load(Ordering::Relaxed), 6 + 12);
    Ok(())
}

#[test]
fn test_no_retry_when_threshold_reached() -> Result<()> {
    let index = line_index(100)?;
    let calls = AtomicUsize::new(0);
    let none = |_: u64| {
        calls.fetch_add(1, Ordering::Relaxed);
        false
    };
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 3)
        .with_ef(100)
        .with_overfetch_factor(4)
        .with_distance_threshold(1.5);

    let hits = index.hybrid_search(&request, Some(&none))?;
    assert!(hits.is_empty());
    // Only ids 0 and 1 are within the threshold, checked once.
    assert_eq!(calls.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test]
fn test_k_zero_and_empty_index() -> Result<()> {
    let index = line_index(10)?;
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 0);
    assert!(index.hybrid_search(&request, None)?.is_empty());

    let empty = HnswIndex::new(HnswIndexConfig::new(2))?;
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 5);
    assert!(empty.hybrid_search(&request, None)?.is_empty());

    let bad = HybridSearchRequest::new(vec![0.0, 0.0, 0.0], 5);
    assert!(matches!(
        empty.hybrid_search(&bad, None),
        Err(VectraError::DimensionMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_nan_threshold_rejected() -> Result<()> {
    let index = line_index(10)?;
    let request = HybridSearchRequest::new(vec![0.0, 0.0], 3).with_distance_threshold(f32::NAN);
    assert!(matches!(
        index.hybrid_search(&request, None),
        Err(VectraError::InvalidOperation(_))
    ));
    Ok(())
}
