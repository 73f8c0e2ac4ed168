use std::sync::Arc;

use rpi_lgpio::{
    Direction, Error, ErrorKind, Gpio, Level, MockChip, MockGpioBackend, Numbering, Pull,
    ShimConfig, VERSION,
};

fn sample_config() -> ShimConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    serde_json::from_str(
        r#"
        {
            "revision": "c03114",
            "sample_interval_us": 200,
            "warnings": false
        }
        "#,
    )
    .expect("valid sample config")
}

fn mock_gpio() -> Gpio<MockGpioBackend> {
    Gpio::new(&sample_config(), Arc::new(MockGpioBackend::default())).expect("mock board")
}

#[test]
fn reports_board_and_version() {
    let gpio = mock_gpio();
    assert_eq!(gpio.rpi_revision(), 3);
    assert_eq!(gpio.rpi_info().board_type, "Pi 4 Model B");
    assert_eq!(VERSION, "0.7.2");
    assert_eq!(gpio.getmode(), None);
}

#[test]
fn construction_fails_off_a_pi() {
    let config = ShimConfig {
        revision: Some("0".into()),
        ..sample_config()
    };
    let err = Gpio::new(&config, Arc::new(MockGpioBackend::default()))
        .err()
        .expect("not a pi");
    assert!(matches!(err, Error::UnrecognizedBoard(_)));
}

#[test]
fn header_pin_26_round_trip() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Board).unwrap();
    gpio.setup(26, Direction::Output, Pull::Off, None).unwrap();
    gpio.output(26, Level::High).unwrap();
    assert_eq!(gpio.input(26).unwrap(), Level::High);
    assert_eq!(gpio.backend().chip().level(7), Level::High);

    gpio.setup(26, Direction::Input, Pull::Off, None).unwrap();
    let err = gpio.output(26, Level::High).unwrap_err();
    assert!(matches!(err, Error::NotOutput));
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn operations_need_a_mode() {
    let gpio = mock_gpio();
    assert!(matches!(
        gpio.setup(17, Direction::Input, Pull::Off, None),
        Err(Error::ModeNotSet)
    ));
    assert!(matches!(gpio.input(17), Err(Error::ModeNotSet)));
    assert!(matches!(gpio.gpio_function(17), Err(Error::ModeNotSet)));
}

#[test]
fn mode_cannot_change_while_set() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.setmode(Numbering::Bcm).unwrap();
    assert!(matches!(
        gpio.setmode(Numbering::Board),
        Err(Error::DifferentMode)
    ));
    assert_eq!(gpio.getmode(), Some(Numbering::Bcm));
}

#[test]
fn invalid_channels_are_rejected() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Board).unwrap();
    let err = gpio
        .setup(1, Direction::Input, Pull::Off, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChannel));
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(matches!(
        gpio.setup(41, Direction::Output, Pull::Off, None),
        Err(Error::InvalidChannel)
    ));
}

#[test]
fn setup_argument_checks() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    assert!(matches!(
        gpio.setup(17, Direction::Output, Pull::Up, None),
        Err(Error::PullOnOutput)
    ));
    assert!(matches!(
        gpio.setup(17, Direction::Input, Pull::Off, Some(Level::High)),
        Err(Error::InitialOnInput)
    ));
    assert!(!gpio.backend().chip().is_claimed(17));
}

#[test]
fn input_needs_setup() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    assert!(matches!(gpio.input(4), Err(Error::NotSetUp)));
    assert!(matches!(gpio.output(4, Level::High), Err(Error::NotOutput)));
}

#[test]
fn pulls_and_initial_levels_reach_the_line() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.setup(22, Direction::Input, Pull::Up, None).unwrap();
    assert_eq!(gpio.backend().chip().pull(22), Pull::Up);
    assert_eq!(gpio.input(22).unwrap(), Level::High);

    gpio.setup(23, Direction::Output, Pull::Off, Some(Level::High))
        .unwrap();
    assert_eq!(gpio.backend().chip().level(23), Level::High);

    gpio.backend().chip().drive(24, Level::High);
    gpio.setup(24, Direction::Input, Pull::Down, None).unwrap();
    assert_eq!(gpio.input(24).unwrap(), Level::High);
}

#[test]
fn output_many_pairs_or_broadcasts() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.setup_many(&[5, 6, 13], Direction::Output, Pull::Off, Some(Level::Low))
        .unwrap();
    let chip = gpio.backend().chip().clone();

    gpio.output_many(&[5, 6, 13], &[Level::High]).unwrap();
    assert!([5, 6, 13].iter().all(|pin| chip.level(*pin) == Level::High));

    gpio.output_many(&[5, 6, 13], &[Level::Low, Level::High, Level::Low])
        .unwrap();
    assert_eq!(chip.level(5), Level::Low);
    assert_eq!(chip.level(6), Level::High);
    assert_eq!(chip.level(13), Level::Low);

    assert!(matches!(
        gpio.output_many(&[5, 6], &[Level::High, Level::Low, Level::High]),
        Err(Error::ValueCountMismatch)
    ));
}

#[test]
fn gpio_function_reports_direction() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    assert_eq!(gpio.gpio_function(4).unwrap(), Direction::Input);
    gpio.setup(4, Direction::Output, Pull::Off, None).unwrap();
    assert_eq!(gpio.gpio_function(4).unwrap(), Direction::Output);
}

#[test]
fn cleanup_all_resets_mode_and_lines() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.setup(17, Direction::Output, Pull::Off, Some(Level::High))
        .unwrap();
    gpio.setup(27, Direction::Input, Pull::Up, None).unwrap();
    let chip = gpio.backend().chip().clone();

    gpio.cleanup(None).unwrap();
    assert_eq!(gpio.getmode(), None);
    assert!(!chip.is_claimed(17));
    assert!(!chip.is_claimed(27));
    assert_eq!(chip.pull(27), Pull::Off);

    gpio.setmode(Numbering::Board).unwrap();
    assert!(matches!(gpio.input(13), Err(Error::NotSetUp)));
}

#[test]
fn cleanup_selected_channels_keeps_the_rest() {
    let gpio = mock_gpio();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.setup_many(&[5, 6], Direction::Output, Pull::Off, None)
        .unwrap();
    let chip = gpio.backend().chip().clone();

    gpio.cleanup(Some(&[5])).unwrap();
    assert!(!chip.is_claimed(5));
    assert!(chip.is_claimed(6));
    assert_eq!(gpio.getmode(), Some(Numbering::Bcm));
    assert!(matches!(gpio.input(5), Err(Error::NotSetUp)));
    gpio.output(6, Level::High).unwrap();
}

#[test]
fn cleanup_without_setup_is_harmless() {
    let gpio = mock_gpio();
    gpio.cleanup(None).unwrap();
    gpio.setmode(Numbering::Bcm).unwrap();
    gpio.cleanup(None).unwrap();
    assert_eq!(gpio.getmode(), None);
}

#[test]
fn lines_held_elsewhere_fail_with_native_error() {
    let chip = MockChip::new(0, 54);
    let first = Gpio::new(&sample_config(), Arc::new(MockGpioBackend::new(chip.clone())))
        .expect("mock board");
    let second = Gpio::new(&sample_config(), Arc::new(MockGpioBackend::new(chip.clone())))
        .expect("mock board");
    first.setmode(Numbering::Bcm).unwrap();
    second.setmode(Numbering::Bcm).unwrap();

    first.setup(18, Direction::Output, Pull::Off, None).unwrap();
    let err = second
        .setup(18, Direction::Input, Pull::Off, None)
        .unwrap_err();
    assert!(matches!(&err, Error::Device(e) if e.0 == "GPIO busy"));
    assert!(matches!(second.input(18), Err(Error::NotSetUp)));

    drop(first);
    assert!(!chip.is_claimed(18));
    second.setup(18, Direction::Input, Pull::Off, None).unwrap();
}
