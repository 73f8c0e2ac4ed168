use log::info;
use std::process::ExitCode;

use rpi_lgpio::{RpiInfo, ShimConfig};

#[cfg(feature = "hardware-gpio")]
use rpi_lgpio::{Gpio, LibgpiodBackend, Numbering, board_pins};

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RPI_LGPIO_CONFIG").ok())
    {
        Some(path) => ShimConfig::load_from_file(&path),
        None => ShimConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let info = match RpiInfo::resolve(&config) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("board revision {}", info.revision);

    match serde_json::to_string_pretty(&info) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }

    #[cfg(feature = "hardware-gpio")]
    if let Err(e) = print_functions(&config) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "hardware-gpio")]
fn print_functions(config: &ShimConfig) -> rpi_lgpio::Result<()> {
    let backend = std::sync::Arc::new(LibgpiodBackend::new()?);
    let gpio = Gpio::new(config, backend)?;
    gpio.setmode(Numbering::Board)?;
    for pin in board_pins() {
        println!("{pin:>2}: {:?}", gpio.gpio_function(pin)?);
    }
    Ok(())
}
