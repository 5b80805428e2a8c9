use candle_core::{DType, Device, Tensor};
use ragdesk_embed::masked_mean_l2;

#[test]
fn all_padding_row_pools_to_zero_not_nan() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 2.0, 2.0, 5.0, 5.0, 5.0,
                                 7.0, 7.0, 7.0, 9.0, 9.0, 9.0],
                               (2, 2, 3), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 0, 0], (2, 2), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();

    // row 0 keeps only its first token: [1, 2, 2] / 3
    for (a, b) in v[0].iter().zip([1.0f32 / 3.0, 2.0 / 3.0, 2.0 / 3.0]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
    assert!(v[1].iter().all(|x| x.is_finite() && x.abs() < 1e-6), "padding row: {:?}", v[1]);
}

#[test]
fn masked_mean_l2_batches_rows_independently() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[3.0f32, 0.0, 1.0, 1.0,
                                 0.0, 2.0, 0.0, 4.0],
                               (2, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!((v[0][0] - 1.0).abs() < 1e-5 && v[0][1].abs() < 1e-5);
    // row 1 mean = [0, 3] -> normalised [0, 1]
    assert!(v[1][0].abs() < 1e-5 && (v[1][1] - 1.0).abs() < 1e-5);
}
