use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectra::error::{Result, VectraError};
use vectra::vector::registry::VectorIndexRegistry;
use vectra::vector::{DistanceMetric, HnswIndex, HnswIndexConfig, vector_distance};

fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

#[test]
fn test_euclidean_nearest_two() -> Result<()> {
    let config = HnswIndexConfig::new(3)
        .with_distance_metric(DistanceMetric::Euclidean)
        .with_seed(1);
    let index = HnswIndex::new(config)?;
    index.insert(1, &[0.0, 0.0, 0.0])?;
    index.insert(2, &[1.0, 0.0, 0.0])?;
    index.insert(3, &[5.0, 5.0, 5.0])?;

    let hits = index.search(&[0.0, 0.0, 0.0], 2, 10)?;
    let pairs: Vec<(u64, f32)> = hits.iter().map(|h| (h.id, h.distance)).collect();
    assert_eq!(pairs, vec![(1, 0.0), (2, 1.0)]);
    Ok(())
}

#[test]
fn test_cosine_zero_vector_sentinel() -> Result<()> {
    assert_eq!(vector_distance(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], "cosine")?, 1.0);

    let index = HnswIndex::new(HnswIndexConfig::new(3).with_seed(2))?;
    index.insert(1, &[0.0, 0.0, 0.0])?;
    let hits = index.search(&[1.0, 1.0, 1.0], 1, 10)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[0].distance, 1.0);
    assert!(!hits[0].distance.is_nan());
    Ok(())
}

#[test]
fn test_unknown_metric_rejected() {
    assert!(matches!(
        vector_distance(&[1.0], &[2.0], "hamming"),
        Err(VectraError::InvalidMetric(_))
    ));
    assert!(matches!(
        vector_distance(&[1.0], &[2.0, 3.0], "euclidean"),
        Err(VectraError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_results_sorted_for_every_metric() -> Result<()> {
    let vectors = random_vectors(200, 8, 3);
    let query = random_vectors(1, 8, 4).remove(0);

    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
    ] {
        let config = HnswIndexConfig::new(8)
            .with_distance_metric(metric)
            .with_seed(5);
        let index = HnswIndex::new(config)?;
        for (i, v) in vectors.iter().enumerate() {
            index.insert(i as u64, v)?;
        }

        let hits = index.search(&query, 10, 50)?;
        assert_eq!(hits.len(), 10, "metric {metric}");
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance, "metric {metric}");
        }
        for hit in &hits {
            let stored = index.get_vector(hit.id).unwrap();
            let expected = metric.distance(&query, &stored)?;
            assert!((hit.distance - expected).abs() < 1e-5);
        }
    }
    Ok(())
}

#[test]
fn test_delete_update_rebuild_lifecycle() -> Result<()> {
    let config = HnswIndexConfig::new(4)
        .with_m(8)
        .with_distance_metric(DistanceMetric::Euclidean)
        .with_max_elements(120)
        .with_seed(6);
    let index = HnswIndex::new(config)?;
    let vectors = random_vectors(100, 4, 7);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(i as u64, v)?;
    }

    for id in (0..100).step_by(2) {
        index.delete(id)?;
    }
    assert_eq!(index.len(), 50);
    assert!(matches!(index.delete(0), Err(VectraError::UnknownId(0))));

    let hits = index.search(&vectors[0], 20, 100)?;
    assert!(hits.iter().all(|h| h.id % 2 == 1));

    index.update(1, &[9.0, 9.0, 9.0, 9.0])?;
    let hits = index.search(&[9.0, 9.0, 9.0, 9.0], 1, 50)?;
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[0].distance, 0.0);

    let stats = index.rebuild()?;
    assert_eq!(stats.live, 50);
    assert!(stats.reclaimed >= 50);
    assert_eq!(index.stats().tombstoned, 0);

    // Slots freed by the rebuild are usable again.
    for id in 1000..1060 {
        index.insert(id, &vectors[(id - 1000) as usize])?;
    }
    assert_eq!(index.len(), 110);
    Ok(())
}

#[test]
fn test_registry_ddl_flow() -> Result<()> {
    let registry = VectorIndexRegistry::new();
    let options: HashMap<String, String> = [
        ("dimension", "2"),
        ("m", "4"),
        ("distance_metric", "euclidean"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let index = registry.create_index_with_options("points", "location", &options)?;
    index.insert(10, &[1.0, 1.0])?;
    index.insert(11, &[4.0, 5.0])?;

    let same = registry
        .get("points", "location")
        .ok_or_else(|| VectraError::other("index missing"))?;
    let hits = same.search(&[4.0, 4.0], 1, 10)?;
    assert_eq!(hits[0].id, 11);

    registry.drop_index("points", "location")?;
    assert!(registry.get("points", "location").is_none());
    // Dropped handles keep working for their holders.
    assert_eq!(index.len(), 2);
    Ok(())
}
