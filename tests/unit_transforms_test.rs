// tests/unit_transforms_test.rs

use pixelgate::core::object::{Gravity, ImageFormat, Transform, TransformChain};

fn resize(width: u32) -> Transform {
    Transform::Resize {
        width: Some(width),
        height: None,
    }
}

#[test]
fn test_fingerprint_is_stable_for_equal_chains() {
    let a = TransformChain::new(vec![resize(100), Transform::Grayscale]);
    let b = TransformChain::new(vec![resize(100), Transform::Grayscale]);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint_hex(), b.fingerprint_hex());
}

#[test]
fn test_fingerprint_is_order_sensitive() {
    let forward = TransformChain::new(vec![resize(100), Transform::Grayscale]);
    let backward = TransformChain::new(vec![Transform::Grayscale, resize(100)]);
    assert_ne!(forward.fingerprint(), backward.fingerprint());
}

#[test]
fn test_fingerprint_depends_on_parameters() {
    let small = TransformChain::new(vec![resize(100)]);
    let large = TransformChain::new(vec![resize(200)]);
    assert_ne!(small.fingerprint(), large.fingerprint());
}

#[test]
fn test_fingerprint_hex_is_fixed_width() {
    let chain = TransformChain::new(vec![Transform::Rotate { angle: 90 }]);
    let hex = chain.fingerprint_hex();
    assert_eq!(hex.len(), 16);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_empty_chain() {
    let chain = TransformChain::default();
    assert!(chain.is_empty());
    assert_eq!(chain.len(), 0);
    // Even the empty chain has a well-defined fingerprint.
    assert_eq!(chain.fingerprint(), TransformChain::default().fingerprint());
}

#[test]
fn test_transform_config_syntax() {
    // Presets in the config file use the same serde encoding.
    #[derive(serde::Deserialize)]
    struct Ops {
        operations: Vec<Transform>,
    }

    let parsed: Ops = toml::from_str(
        r#"
        operations = [
            { kind = "resize", width = 100, height = 100 },
            { kind = "crop", width = 50, height = 50, gravity = "north" },
            { kind = "format", format = "webp" },
        ]
        "#,
    )
    .unwrap();

    assert_eq!(
        parsed.operations,
        vec![
            Transform::Resize {
                width: Some(100),
                height: Some(100)
            },
            Transform::Crop {
                width: 50,
                height: 50,
                gravity: Gravity::North
            },
            Transform::Format {
                format: ImageFormat::Webp
            },
        ]
    );
}

#[test]
fn test_image_format_content_types() {
    assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
    assert_eq!(ImageFormat::Webp.content_type(), "image/webp");
}
