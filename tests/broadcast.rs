use rstest::rstest;
use tensorgrad::broadcast::{broadcast_data, broadcast_shapes, reduce_to_shape};
use tensorgrad::{Error, Shape, Tensor};

#[rstest]
#[case(vec![3, 1], vec![2, 1, 4], Some(vec![2, 3, 4]))]
#[case(vec![5], vec![5], Some(vec![5]))]
#[case(vec![], vec![2, 3], Some(vec![2, 3]))]
#[case(vec![1, 1], vec![7], Some(vec![1, 7]))]
#[case(vec![0, 1], vec![1, 3], Some(vec![0, 3]))]
#[case(vec![2, 3], vec![3, 2], None)]
#[case(vec![4], vec![3], None)]
fn shape_rules(#[case] a: Vec<usize>, #[case] b: Vec<usize>, #[case] expected: Option<Vec<usize>>) {
    let (a, b) = (Shape::new(a), Shape::new(b));
    let ab = broadcast_shapes(&a, &b);
    let ba = broadcast_shapes(&b, &a);
    match expected {
        Some(dims) => {
            assert_eq!(ab.unwrap().dims(), dims.as_slice());
            assert_eq!(ba.unwrap().dims(), dims.as_slice());
        }
        None => {
            assert!(matches!(ab, Err(Error::ShapeMismatch { .. })));
            assert!(ba.is_err());
        }
    }
}

#[rstest]
#[case(vec![2, 1], vec![1, 3], vec![3, 1, 1])]
#[case(vec![4], vec![2, 4], vec![1, 1, 4])]
#[case(vec![1], vec![5, 1], vec![5, 1, 1])]
fn broadcasting_is_associative(#[case] a: Vec<usize>, #[case] b: Vec<usize>, #[case] c: Vec<usize>) {
    let (a, b, c) = (Shape::new(a), Shape::new(b), Shape::new(c));
    let left = broadcast_shapes(&broadcast_shapes(&a, &b).unwrap(), &c).unwrap();
    let right = broadcast_shapes(&a, &broadcast_shapes(&b, &c).unwrap()).unwrap();
    assert_eq!(left, right);
}

#[rstest]
#[case(vec![3, 1], vec![2, 3, 1], vec![4, 2, 3, 5])]
#[case(vec![1], vec![1, 4], vec![3, 4])]
#[case(vec![2, 1, 3], vec![2, 4, 3], vec![5, 2, 4, 3])]
#[case(vec![], vec![2], vec![3, 2])]
#[case(vec![4], vec![4], vec![2, 1, 4])]
fn chained_broadcast_matches_direct(
    #[case] from: Vec<usize>,
    #[case] s1: Vec<usize>,
    #[case] s2: Vec<usize>,
) {
    let t = Tensor::<i64>::arange(from);
    let target = broadcast_shapes(&Shape::new(s1.clone()), &Shape::new(s2.clone())).unwrap();
    let chained = t.broadcast_to(s1).unwrap().broadcast_to(s2).unwrap();
    let direct = t.broadcast_to(target.clone()).unwrap();
    assert_eq!(chained.dims(), target.dims());
    assert_eq!(chained.to_vec(), direct.to_vec());
}

#[rstest]
#[case(vec![2, 3], vec![3, 2])]
#[case(vec![2, 3], vec![6])]
#[case(vec![4, 1, 2], vec![2, 4])]
#[case(vec![], vec![1, 1])]
fn reshape_round_trip(#[case] from: Vec<usize>, #[case] to: Vec<usize>) {
    let t = Tensor::<i32>::arange(from.clone());
    let back = t.reshape(to).unwrap().reshape(from).unwrap();
    assert_eq!(back, t);
}

#[test]
fn reshape_rejects_size_change() {
    let t = Tensor::<f64>::zeros((2, 3));
    assert!(matches!(t.reshape((4, 2)), Err(Error::ShapeMismatch { .. })));
}

#[test]
fn expand_then_reduce_scales_by_repeats() {
    let from = Shape::from((3, 1));
    let to = Shape::from((2, 3, 4));
    let data = vec![1.0, 2.0, 3.0];
    let expanded = broadcast_data(&data, &from, &to).unwrap();
    assert_eq!(expanded.len(), 24);
    let reduced = reduce_to_shape(&expanded, &to, &from).unwrap();
    assert_eq!(reduced, vec![8.0, 16.0, 24.0]);
}

#[test]
fn broadcast_to_gradient_sums_back() {
    let t = Tensor::of([1.0, 2.0]);
    let b = t.broadcast_to((3, 2)).unwrap();
    assert_eq!(b.to_vec(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    b.backward().unwrap();
    assert_eq!(t.grad().unwrap().to_vec(), vec![3.0, 3.0]);
}

#[test]
fn incompatible_operands_fail_elementwise_ops() {
    let a = Tensor::<f64>::ones((2, 3));
    let b = Tensor::<f64>::ones((3, 2));
    assert!(matches!(a.add(&b), Err(Error::ShapeMismatch { .. })));
}
