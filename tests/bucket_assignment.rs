// Bucket assignment shared between concurrent annotators.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use cs_annotator::assignment::BucketAssigner;
use cs_annotator::AnnotatorError;

#[test]
fn returning_annotator_keeps_bucket_while_others_fill_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let assigner = BucketAssigner::new(dir.path().join("user_sets.csv"), 20, 2, 5);

    assert_eq!(assigner.assign("A", 100).unwrap(), 0);
    assert_eq!(assigner.assign("B", 100).unwrap(), 0);
    assert_eq!(assigner.assign("C", 100).unwrap(), 1);
    assert_eq!(assigner.assign("A", 100).unwrap(), 0);

    let text = std::fs::read_to_string(assigner.table_path()).unwrap();
    assert_eq!(text, "username,bucket\nA,0\nB,0\nC,1\n");
}

#[test]
fn racing_first_time_annotators_never_overfill_a_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user_sets.csv");
    let annotators = 12;
    let barrier = Arc::new(Barrier::new(annotators));

    let handles: Vec<_> = (0..annotators)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Each thread owns its assigner, as separate processes would.
                let assigner = BucketAssigner::new(path, 20, 2, 5);
                barrier.wait();
                assigner.assign(&format!("annotator-{i}"), 100).unwrap()
            })
        })
        .collect();

    let mut occupancy: HashMap<usize, usize> = HashMap::new();
    for handle in handles {
        *occupancy.entry(handle.join().unwrap()).or_default() += 1;
    }

    assert!(occupancy.values().all(|&n| n <= 2), "{occupancy:?}");
    let mut buckets: Vec<_> = occupancy.keys().copied().collect();
    buckets.sort_unstable();
    assert_eq!(buckets, (0..6).collect::<Vec<_>>());

    let table = BucketAssigner::new(&path, 20, 2, 5).read_table().unwrap();
    assert_eq!(table.len(), annotators);
}

#[test]
fn returning_annotators_keep_their_bucket_when_full() {
    let dir = tempfile::tempdir().unwrap();
    let assigner = BucketAssigner::new(dir.path().join("sets.csv"), 1, 2, 5);
    assigner.assign("first", 100).unwrap();
    assigner.assign("second", 100).unwrap();

    assert!(matches!(
        assigner.assign("third", 100),
        Err(AnnotatorError::NoCapacity { .. })
    ));
    assert_eq!(assigner.assign("second", 100).unwrap(), 0);
}
