use ccsds_tc::bch::BchConfig;
use ccsds_tc::cltu::{Cltu, CltuSequences};
use ccsds_tc::Error;

// Process-wide defaults can only be set once, so this is the only test in this binary.
#[test]
fn test_global_sequences() {
    let custom = CltuSequences {
        acquisition: vec![0xaa; 4],
        start: CltuSequences::parse_hex("EB90").unwrap(),
        tail: CltuSequences::parse_hex("C5C5C5C5C5C5C579").unwrap(),
        idle: vec![0xaa; 2],
    };
    CltuSequences::set_global(custom.clone()).unwrap();
    assert_eq!(CltuSequences::global(), custom);

    let zult = CltuSequences::set_global(CltuSequences::default());
    assert!(matches!(zult, Err(Error::InvalidState(_))), "{zult:?}");

    let cltu = Cltu::builder()
        .codeblocks(vec![])
        .data(vec![1, 2])
        .start_sequence(vec![0x12, 0x34])
        .build()
        .unwrap();
    assert_eq!(cltu.acquisition_sequence(), &[0xaa; 4]);
    assert_eq!(cltu.start_sequence(), &[0x12, 0x34]);
    assert_eq!(cltu.idle_sequence(), &[0xaa; 2]);

    let parsed = Cltu::parse(&cltu.to_bytes(), &CltuSequences::global(), &BchConfig::default());
    assert!(parsed.is_err(), "overridden start sequence is not the global one");
}
