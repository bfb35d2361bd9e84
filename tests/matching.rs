use facematch::{
    distance, EnrollmentRecord, Embedding, Identity, MatchResult, Matcher, MAX_DISTANCE,
};

fn rec(label: &str, v: &[f32]) -> EnrollmentRecord {
    EnrollmentRecord::new(label, Embedding::new(v.to_vec()))
}

/// Small deterministic jitter around `base`, one vector per seed.
fn jittered(base: &[f32], seed: u32) -> Vec<f32> {
    base.iter()
        .enumerate()
        .map(|(i, v)| {
            let h = (seed.wrapping_mul(2654435761) ^ (i as u32).wrapping_mul(40503)) % 1000;
            v + (h as f32 / 1000.0 - 0.5) * 0.02
        })
        .collect()
}

fn two_clusters() -> (Vec<f32>, Vec<f32>, Vec<EnrollmentRecord>) {
    let v1 = vec![1.0, 0.2, 0.0, 0.1];
    let v2 = vec![0.0, 0.1, 1.0, -0.2];
    let mut records = Vec::new();
    for seed in 0..5 {
        records.push(rec("A", &jittered(&v1, seed)));
        records.push(rec("B", &jittered(&v2, seed + 100)));
    }
    (v1, v2, records)
}

#[test]
fn test_identical_samples_exact_match() {
    let store = vec![
        rec("alice", &[1.0, 0.0, 0.0]),
        rec("alice", &[1.0, 0.0, 0.0]),
        rec("alice", &[1.0, 0.0, 0.0]),
    ];
    let result = Matcher::new(0.6, 3).identify(&Embedding::new(vec![1.0, 0.0, 0.0]), &store);
    assert_eq!(
        result,
        MatchResult {
            identity: Identity::Known("alice".into()),
            score: 0.0,
        }
    );
}

#[test]
fn test_orthogonal_probe_is_unknown() {
    let store = vec![rec("alice", &[1.0, 0.0, 0.0])];
    let result = Matcher::new(0.6, 3).identify(&Embedding::new(vec![0.0, 1.0, 0.0]), &store);
    assert_eq!(result.identity, Identity::Unknown);
    assert!((result.score - 1.0).abs() < 1e-6);
}

#[test]
fn test_empty_store_unknown_for_any_probe() {
    let m = Matcher::new(0.65, 3);
    for probe in [vec![1.0, 0.0], vec![0.0; 8], vec![], vec![f32::NAN]] {
        let result = m.identify(&Embedding::new(probe), &[]);
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.score, f32::INFINITY);
    }
}

#[test]
fn test_two_clusters() {
    let (v1, v2, records) = two_clusters();
    assert!(distance(&v1, &v2) > 0.9);
    let m = Matcher::new(0.6, 3);

    let near_v1 = Embedding::new(jittered(&v1, 999));
    let result = m.identify(&near_v1, &records);
    assert_eq!(result.identity, Identity::Known("A".into()));
    assert!(result.score < m.threshold());

    // orthogonal to both cluster centres, so equally far from each
    let between = vec![-0.2, 1.0, -0.1, 0.0];
    let to_a = distance(&between, &v1);
    let to_b = distance(&between, &v2);
    assert!((to_a - to_b).abs() < 1e-6);
    assert!(to_a > m.threshold());

    let result = m.identify(&Embedding::new(between), &records);
    assert_eq!(result.identity, Identity::Unknown);
    assert!(result.score > m.threshold());
}

#[test]
fn test_mismatched_dimensions_never_win() {
    let records = vec![
        rec("legacy", &[1.0, 0.0]),
        rec("legacy", &[1.0, 0.0]),
        rec("current", &[0.6, 0.8, 0.0]),
    ];
    let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
    let ranked = Matcher::new(0.6, 3).rank(&probe, &records);
    assert_eq!(ranked[0].label, "current");
    assert_eq!(ranked[1].score, MAX_DISTANCE);

    let only_legacy = &records[..2];
    let result = Matcher::new(0.6, 3).identify(&probe, only_legacy);
    assert_eq!(result.identity, Identity::Unknown);
}

#[test]
fn test_single_sample_groups_are_nearest_neighbour() {
    let records = vec![
        rec("a", &[1.0, 0.0]),
        rec("b", &[0.8, 0.6]),
        rec("c", &[0.0, 1.0]),
    ];
    let probe = Embedding::new(vec![0.9, 0.45]);
    let result = Matcher::new(0.6, 3).identify(&probe, &records);
    let expected = records
        .iter()
        .map(|r| (r.label.clone(), probe.distance(&r.embedding)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    assert_eq!(result.identity, Identity::Known(expected.0));
    assert_eq!(result.score, expected.1);
}

#[test]
fn test_repeated_identification_is_stable() {
    let (v1, _, records) = two_clusters();
    let m = Matcher::new(0.6, 3);
    let probe = Embedding::new(jittered(&v1, 7));
    let first = m.identify(&probe, &records);
    for _ in 0..5 {
        assert_eq!(m.identify(&probe, &records), first);
    }
}
