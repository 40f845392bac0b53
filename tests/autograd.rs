use std::thread;

use rand::Rng;
use tensorgrad::approx::{F64_AVG_ERROR, F64_MAX_ERROR};
use tensorgrad::{Error, Result, Tensor, grad};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_tensor(dims: &[usize], low: f64, high: f64) -> Tensor {
    let mut rng = rand::rng();
    let size: usize = dims.iter().product();
    let data = (0..size).map(|_| rng.random_range(low..high)).collect();
    Tensor::from_vec(data, dims.to_vec()).unwrap()
}

/// Compares the gradient of `sum(f(x))` with central differences.
fn check_gradient(x: &Tensor, f: impl Fn(&Tensor) -> Result<Tensor>) {
    let h = 1e-5;
    f(x).unwrap().sum_all().unwrap().backward().unwrap();
    let analytic = x.grad().unwrap().to_vec();

    let base = x.to_vec();
    let eval = |values: Vec<f64>| -> f64 {
        let t = Tensor::from_vec(values, x.shape()).unwrap();
        f(&t).unwrap().sum_all().unwrap().item().unwrap()
    };
    for i in 0..base.len() {
        let mut up = base.clone();
        up[i] += h;
        let mut down = base.clone();
        down[i] -= h;
        let numeric = (eval(up) - eval(down)) / (2.0 * h);
        assert!(
            (numeric - analytic[i]).abs() < 1e-4 * (1.0 + numeric.abs()),
            "element {i}: numeric {numeric}, analytic {}",
            analytic[i]
        );
    }
}

#[test]
fn diamond_receives_both_paths() {
    init_logger();
    let a = Tensor::of([3.0]);
    let b = a.mul_scalar(2.0).unwrap();
    let c = a.exp().unwrap();
    let d = b.add(&c).unwrap();
    d.backward().unwrap();
    let expected = 2.0 + 3f64.exp();
    assert!((a.grad().unwrap().item().unwrap() - expected).abs() < F64_AVG_ERROR);
}

#[test]
fn gradients_accumulate_across_passes() {
    let x = Tensor::of([1.0, 2.0]);
    x.mul_scalar(3.0).unwrap().sum_all().unwrap().backward().unwrap();
    x.mul(&x).unwrap().sum_all().unwrap().backward().unwrap();
    assert_eq!(x.grad().unwrap().to_vec(), vec![5.0, 7.0]);
}

#[test]
fn zero_grad_clears_the_whole_graph() {
    init_logger();
    let a = Tensor::of([1.0, 2.0]);
    let b = a.exp().unwrap();
    let c = b.sum_all().unwrap();
    c.backward().unwrap();
    assert!(a.grad().is_some());

    c.zero_grad();
    for t in [&a, &b, &c] {
        assert!(t.grad().is_none());
        assert!(t.parents().is_empty());
        assert!(t.operation_name().is_none());
    }
}

#[test]
fn backward_on_constant_is_rejected() {
    let _guard = grad::no_grad();
    let a = Tensor::of([1.0]);
    let b = a.exp().unwrap();
    assert!(!b.requires_grad());
    assert!(matches!(b.backward(), Err(Error::InvalidAutogradState(_))));
}

#[test]
fn operands_without_grad_receive_nothing() {
    let w = Tensor::of([1.0, 2.0]);
    let x = {
        let _guard = grad::no_grad();
        Tensor::of([3.0, 4.0])
    };
    w.mul(&x).unwrap().sum_all().unwrap().backward().unwrap();
    assert_eq!(w.grad().unwrap().to_vec(), vec![3.0, 4.0]);
    assert!(x.grad().is_none());
}

#[test]
fn no_grad_is_per_thread() {
    let _guard = grad::no_grad();
    assert!(!Tensor::<f64>::zeros(1).requires_grad());
    let other = thread::spawn(|| Tensor::<f64>::zeros(1).requires_grad())
        .join()
        .unwrap();
    assert!(other);
    {
        let _inner = grad::enable_grad();
        assert!(Tensor::<f64>::zeros(1).requires_grad());
    }
    assert!(!grad::is_grad_enabled());
}

#[test]
fn broadcast_gradients_have_owner_shape() {
    let a = Tensor::<f64>::ones((3, 1));
    let b = Tensor::<f64>::ones(4);
    let c = a.add(&b).unwrap();
    assert_eq!(c.dims(), vec![3, 4]);
    c.backward().unwrap();
    assert_eq!(a.grad().unwrap().dims(), vec![3, 1]);
    assert_eq!(a.grad().unwrap().to_vec(), vec![4.0; 3]);
    assert_eq!(b.grad().unwrap().to_vec(), vec![3.0; 4]);
}

#[test]
fn update_commits_without_history() {
    let w = Tensor::of([1.0, 2.0]);
    let y = w.mul_scalar(2.0).unwrap();
    y.backward().unwrap();
    w.update(&y, true).unwrap();
    assert_eq!(w.to_vec(), vec![2.0, 4.0]);
    assert!(w.grad().is_none());
    assert!(w.is_leaf());
}

#[test]
fn elementwise_gradients_match_finite_differences() {
    init_logger();
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| t.exp());
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| t.log());
    let x = random_tensor(&[3, 4], -2.0, 2.0);
    check_gradient(&x, |t| t.sigmoid());
    let x = random_tensor(&[3, 4], -2.0, 2.0);
    check_gradient(&x, |t| t.tanh());
    let x = random_tensor(&[3, 4], -2.0, 2.0);
    check_gradient(&x, |t| t.gelu());
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| t.sqrt());
}

#[test]
fn binary_gradients_match_finite_differences() {
    let y = random_tensor(&[4], 0.5, 2.0);
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| t.div(&y));
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| y.div(t));
    let x = random_tensor(&[3, 4], 0.5, 2.0);
    check_gradient(&x, |t| t.pow(&y));
    let x = random_tensor(&[3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.mul(t)?.sub(&y));
}

#[test]
fn composite_gradients_match_finite_differences() {
    let w = random_tensor(&[4, 2], -1.0, 1.0);
    let x = random_tensor(&[3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.matmul(&w)?.tanh());
    let x = random_tensor(&[2, 3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.softmax(-1, 2.0)?.mul(&w.t()?.sum(0, false)?));
    let x = random_tensor(&[3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.variance(0, false));
    let x = random_tensor(&[3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.t()?.reshape((2, 6))?.mean(1, true));
    let target = Tensor::of([0.0, 1.0, 0.0, 0.0]);
    let x = random_tensor(&[3, 4], -1.0, 1.0);
    check_gradient(&x, |t| t.cross_entropy_loss(&target));
}

#[test]
fn no_grad_only_affects_new_leaves() {
    let w = Tensor::<f64>::of([2.0]);
    let y = {
        let _guard = grad::no_grad();
        // operands created before the scope still record the graph
        w.mul_scalar(3.0).unwrap()
    };
    assert!(y.requires_grad());
    y.backward().unwrap();
    assert!((w.grad().unwrap().item().unwrap() - 3.0).abs() < F64_MAX_ERROR);
}
