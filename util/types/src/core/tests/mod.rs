use crate::core::{error::FromHexError, Byte32, FederationParams, HexBytes};
use std::str::FromStr;

#[test]
fn test_byte32_from_str() {
    let text = "0x00000000000000000000000000000000000000000000000000000000000000ff";
    let hash = Byte32::from_str(text).unwrap();
    assert_eq!(hash.as_bytes()[31], 0xff);
    assert_eq!(hash.to_string(), text);
    assert_eq!(Byte32::from_str(&text[2..]).unwrap(), hash);

    assert_eq!(
        Byte32::from_str("0x00ff"),
        Err(FromHexError::InvalidLength(4))
    );
    assert!(matches!(
        Byte32::from_str(&format!("0x{}", "zz".repeat(32))),
        Err(FromHexError::InvalidCharacter(_))
    ));
    assert!(Byte32::zero().is_zero());
    assert!(!hash.is_zero());
}

#[test]
fn test_hex_bytes_from_str() {
    assert_eq!(HexBytes::from_str("0x").unwrap(), HexBytes::default());
    assert_eq!(HexBytes::from_str("").unwrap(), HexBytes::default());
    assert_eq!(&HexBytes::from_str("0x5121").unwrap()[..], &[0x51, 0x21]);
    assert_eq!(
        HexBytes::from_str("0x512"),
        Err(FromHexError::InvalidLength(3))
    );
    assert_eq!(HexBytes::from(vec![0x51u8]).to_string(), "0x51");
}

#[test]
fn test_federation_params_from_toml() {
    let params: FederationParams = toml::from_str(
        r#"
        signblock_script = "0x51"
        signblock_witness_limit = 1416
        fedpeg_program = "0x0020e51211e91d9cf4aec3bdc370a0303acde5d24baedb12235fdd2786885069d91c"
        fedpeg_script = "0x51"
        extension_space = ["0x02aa", "0x02bb"]
        "#,
    )
    .unwrap();
    assert!(params.is_full());
    assert_eq!(params.signblock_witness_limit, 1416);
    assert_eq!(params.extension_space.len(), 2);
    assert_eq!(params.extension_space[1].to_string(), "0x02bb");

    let empty_signer = FederationParams {
        signblock_script: HexBytes::default(),
        ..params
    };
    assert!(!empty_signer.is_full());
}
