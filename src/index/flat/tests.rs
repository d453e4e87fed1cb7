use super::*;

fn sample_index() -> FlatL2Index {
    FlatL2Index::from_vectors(&[
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 2.0],
        vec![3.0, 3.0],
    ])
    .expect("vectors share a dimension")
}

#[test]
fn build_from_vectors() {
    let index = sample_index();

    assert_eq!(index.dimension(), 2);
    assert_eq!(index.len(), 4);
    assert_eq!(index.vectors().nth(2), Some([0.0, 2.0].as_slice()));
    assert!(index.validate().is_ok());
}

#[test]
fn mixed_dimensions_are_rejected() {
    let result = FlatL2Index::from_vectors(&[vec![1.0, 2.0], vec![1.0]]);

    assert_eq!(
        result,
        Err(FlatIndexError::DimensionMismatch {
            position: 1,
            expected: 2,
            actual: 1,
        })
    );
}

#[test]
fn search_returns_closest_first() {
    let index = sample_index();
    let neighbors = index.search(&[0.9, 0.1], 3).expect("search should succeed");

    let positions: Vec<usize> = neighbors.iter().map(|n| n.position).collect();
    assert_eq!(positions, vec![1, 0, 2]);
    assert!((neighbors[0].distance - 0.02).abs() < 1e-6);
    assert!(
        neighbors
            .windows(2)
            .all(|pair| pair[0].distance <= pair[1].distance)
    );
}

#[test]
fn search_saturates_at_corpus_size() {
    let index = sample_index();
    let neighbors = index.search(&[0.0, 0.0], 10).expect("search should succeed");

    assert_eq!(neighbors.len(), 4);
    assert_eq!(neighbors[0].position, 0);
    assert_eq!(neighbors[3].position, 3);
}

#[test]
fn ties_break_by_position() {
    let index = FlatL2Index::from_vectors(&[vec![1.0], vec![-1.0], vec![1.0]])
        .expect("vectors share a dimension");

    let neighbors = index.search(&[0.0], 3).expect("search should succeed");
    let positions: Vec<usize> = neighbors.iter().map(|n| n.position).collect();

    assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn repeated_searches_are_identical() {
    let index = sample_index();
    let first = index.search(&[2.0, 1.0], 2).expect("search should succeed");
    let second = index.search(&[2.0, 1.0], 2).expect("search should succeed");

    assert_eq!(first, second);
}

#[test]
fn empty_index_returns_nothing() {
    let index = FlatL2Index::from_vectors(&[]).expect("empty input is valid");

    assert!(index.is_empty());
    assert!(
        index
            .search(&[1.0, 2.0, 3.0], 5)
            .expect("empty search should succeed")
            .is_empty()
    );
}

#[test]
fn zero_k_returns_nothing() {
    assert!(
        sample_index()
            .search(&[0.0, 0.0], 0)
            .expect("search should succeed")
            .is_empty()
    );
}

#[test]
fn query_dimension_must_match() {
    let result = sample_index().search(&[1.0, 2.0, 3.0], 2);
    assert!(matches!(
        result,
        Err(FlatIndexError::DimensionMismatch { expected: 2, actual: 3, .. })
    ));
}

#[test]
fn truncated_buffer_fails_validation() {
    let index: FlatL2Index =
        serde_json::from_str(r#"{"dimension":3,"data":[1.0,2.0,3.0,4.0]}"#)
            .expect("structure should deserialize");

    assert_eq!(
        index.validate(),
        Err(FlatIndexError::Truncated {
            len: 4,
            dimension: 3,
        })
    );
}
