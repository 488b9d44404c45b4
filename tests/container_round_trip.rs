//! Writer+reader round trip across every supported scheme (property #3).

use quinfer::container::{write_container, NamedTensor, QmfReader};
use quinfer::quant::QuantScheme;
use quinfer::weight_tensor::WeightTensor;

#[test]
fn round_trips_every_scheme_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.qmf");

    let f32_data: Vec<f32> = (0..16).map(|i| i as f32 * 0.25).collect();
    let f32_tensor = WeightTensor::from_f32(f32_data, 16, 1);

    let schemes = [
        QuantScheme::Q8_0,
        QuantScheme::Q4_0,
        QuantScheme::Q4_1,
        QuantScheme::Q4_K,
        QuantScheme::Q6_K,
    ];
    let quantized: Vec<WeightTensor> = schemes
        .iter()
        .map(|&scheme| {
            let data: Vec<f32> = (0..256).map(|i| (i as f32 * 0.01).sin()).collect();
            WeightTensor::quantize(scheme, &data, 256, 1).unwrap()
        })
        .collect();

    let mut named = vec![NamedTensor {
        name: "f32_tensor".to_string(),
        tensor: &f32_tensor,
    }];
    for (scheme, tensor) in schemes.iter().zip(quantized.iter()) {
        named.push(NamedTensor {
            name: scheme.name().to_string(),
            tensor,
        });
    }

    write_container(&path, &named, serde_json::json!({"format": "test"})).unwrap();

    let reader = QmfReader::open(&path).unwrap();
    assert_eq!(reader.tensor_names().len(), named.len());

    let loaded_f32 = reader.load("f32_tensor").unwrap();
    match (&loaded_f32, &f32_tensor) {
        (WeightTensor::F32 { data: a, .. }, WeightTensor::F32 { data: b, .. }) => {
            assert_eq!(a, b);
        }
        _ => panic!("expected F32 tensors"),
    }

    for (scheme, original) in schemes.iter().zip(quantized.iter()) {
        let loaded = reader.load(scheme.name()).unwrap();
        assert_eq!(loaded.to_fp32(), original.to_fp32());
    }
}
