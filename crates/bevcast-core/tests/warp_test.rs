use bevcast_core::grid::GridBound;
use bevcast_core::{FeatureWarper, WarpMode};
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use proptest::prelude::*;

type Backend = NdArray<f32>;

fn max_abs_diff(a: Tensor<Backend, 4>, b: Tensor<Backend, 4>) -> f32 {
    (a - b).abs().max().into_scalar()
}

#[test]
fn test_integer_shift_matches_slicing() {
    let device = Default::default();
    let [b, c, h, w] = [2, 3, 6, 8];
    let features = Tensor::<Backend, 4>::random([b, c, h, w], Distribution::Normal(0.0, 1.0), &device);

    // Read two rows down: output row y holds input row y + 2
    let flow_x = Tensor::<Backend, 4>::zeros([b, 1, h, w], &device);
    let flow_y = Tensor::<Backend, 4>::ones([b, 1, h, w], &device).mul_scalar(2.0);
    let flow = Tensor::cat(vec![flow_x, flow_y], 1);

    for mode in [WarpMode::Bilinear, WarpMode::Nearest] {
        let warped = FeatureWarper::new(mode).warp(features.clone(), flow.clone()).unwrap();

        let moved = warped.clone().slice([0..b, 0..c, 0..h - 2, 0..w]);
        let expected = features.clone().slice([0..b, 0..c, 2..h, 0..w]);
        assert!(max_abs_diff(moved, expected) < 1e-6);

        // Rows sampled from beyond the grid are zero-filled
        let vacated = warped.slice([0..b, 0..c, h - 2..h, 0..w]);
        let peak: f32 = vacated.abs().max().into_scalar();
        assert_eq!(peak, 0.0);
    }
}

#[test]
fn test_flow_far_outside_grid_reads_zero() {
    let device = Default::default();
    let features = Tensor::<Backend, 4>::ones([1, 2, 4, 4], &device);
    let flow = Tensor::<Backend, 4>::ones([1, 2, 4, 4], &device).mul_scalar(100.0);

    let warped = FeatureWarper::default().warp(features, flow).unwrap();
    let total: f32 = warped.sum().into_scalar();
    assert_eq!(total, 0.0);
}

proptest! {
    #[test]
    fn test_zero_flow_identity(
        b in 1usize..3, c in 1usize..4, h in 1usize..9, w in 1usize..9,
    ) {
        let device = Default::default();
        let features = Tensor::<Backend, 4>::random([b, c, h, w], Distribution::Uniform(-5.0, 5.0), &device);
        let flow = Tensor::<Backend, 4>::zeros([b, 2, h, w], &device);

        let warped = FeatureWarper::default().warp(features.clone(), flow).unwrap();
        prop_assert_eq!(warped.dims(), [b, c, h, w]);
        prop_assert!(max_abs_diff(warped, features) < 1e-5);
    }

    #[test]
    fn test_bilinear_stays_within_input_range(
        dx in -3.0f32..3.0, dy in -3.0f32..3.0,
    ) {
        let device = Default::default();
        let features = Tensor::<Backend, 4>::random([1, 2, 6, 6], Distribution::Uniform(0.0, 1.0), &device);
        let flow_x = Tensor::<Backend, 4>::ones([1, 1, 6, 6], &device).mul_scalar(dx);
        let flow_y = Tensor::<Backend, 4>::ones([1, 1, 6, 6], &device).mul_scalar(dy);
        let flow = Tensor::cat(vec![flow_x, flow_y], 1);

        let warped = FeatureWarper::new(WarpMode::Bilinear).warp(features, flow).unwrap();
        let lo: f32 = warped.clone().min().into_scalar();
        let hi: f32 = warped.max().into_scalar();
        // Convex blend of values in [0, 1] and zero padding
        prop_assert!(lo >= -1e-6);
        prop_assert!(hi <= 1.0 + 1e-6);
    }

    #[test]
    fn test_cell_lookup_roundtrip(
        min in -100.0f64..0.0, extent in 1.0f64..200.0, step in 0.1f64..2.0, frac in 0.0f64..1.0,
    ) {
        let bound = GridBound::new(min, min + extent, step);
        let cells = bound.cells().unwrap();
        prop_assume!(cells > 0);

        let index = ((cells - 1) as f64 * frac) as usize;
        let center = bound.cell_center(index);
        prop_assume!(center < bound.max);
        prop_assert_eq!(bound.cell_of(center), Some(index));
    }
}
