use tensorgrad::approx::F64_MIN_ERROR;
use tensorgrad::{grad, tensor, tensors::Tensor, DType};

#[test]
fn test_tensor_creation() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
    assert_eq!(t.dims(), vec![2, 2]);
    assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.dtype(), DType::Float64);
    assert!(t.is_leaf());
    assert!(t.requires_grad());
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.dims(), vec![2, 2]);
    assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);

    let b = tensor!([true, false]);
    assert_eq!(b.dtype(), DType::Bool);
}

#[test]
fn test_matmul_backprop() {
    let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    let b = tensor!([[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]);

    let output = a.matmul(&b).unwrap();
    assert_eq!(output.dims(), vec![2, 2]);
    assert_eq!(output.operation_name(), Some("matmul"));
    output.backward_with_grad(&Tensor::ones((2, 2))).unwrap();
    assert_eq!(a.grad().unwrap().dims(), vec![2, 3]);
    assert_eq!(b.grad().unwrap().dims(), vec![3, 2]);
    assert_eq!(
        a.grad().unwrap().to_vec(),
        vec![15.0, 19.0, 23.0, 15.0, 19.0, 23.0]
    );
}

#[test]
fn test_relu_backprop() {
    let t = Tensor::of([-1.0, 0.5, 1.0]);
    let output = t.relu().unwrap();
    assert_eq!(output.to_vec(), vec![0.0, 0.5, 1.0]);
    output.backward_with_grad(&Tensor::of([1.0, 1.0, 1.0])).unwrap();
    assert_eq!(t.grad().unwrap().to_vec(), vec![0.0, 1.0, 1.0]);
}

#[test]
fn test_mse_loss() {
    let pred = Tensor::of([1.0, 2.0]);
    let target = Tensor::of([1.5, 2.5]);
    let loss = pred.mse_loss(&target).unwrap();
    assert_eq!(loss.to_vec(), vec![0.5]);
    loss.backward().unwrap();
    assert_eq!(pred.grad().unwrap().to_vec(), vec![-1.0, -1.0]);
}

#[test]
fn test_sgd_step() {
    let w = Tensor::of([1.0, 2.0]);
    let loss = w.mul(&Tensor::of([0.1, 0.2])).unwrap().sum_all().unwrap();
    loss.backward().unwrap();

    let step = {
        let _guard = grad::no_grad();
        let g = w.grad().unwrap();
        w.sub(&g.mul_scalar(0.5).unwrap()).unwrap()
    };
    w.update(&step, true).unwrap();
    w.zero_grad();

    assert!(w.allclose(&Tensor::of([0.95, 1.9]), F64_MIN_ERROR));
    assert!(w.grad().is_none());
    assert!(w.is_leaf());
    assert!(w.requires_grad());
}

#[test]
fn test_display() {
    let t = tensor!([[1, 2], [3, 4]]);
    assert_eq!(format!("{t}"), "[[1, 2], [3, 4]]");
}
