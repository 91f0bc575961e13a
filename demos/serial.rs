use std::env;

use fugit::MillisDurationU32;
use ihr_mono::{
    DeviceModel, Monochromator, WaitPolicy,
    serial::SerialTransport,
    types::{GratingIndex, SerialConfig, Slit, SlitTarget},
};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 19200;
const TARGET_WAVELENGTH_NM: f64 = 632.8; // HeNe line
const ENTRANCE_SLIT_MM: f64 = 0.5;

fn main() {
    env_logger::init();

    // Usage: serial <port> [model]
    let mut args = env::args().skip(1);
    let Some(port_name) = args.next() else {
        eprintln!("usage: serial <port> [iHR320|iHR550]");
        std::process::exit(1);
    };
    let model: DeviceModel = args
        .next()
        .as_deref()
        .unwrap_or("iHR320")
        .parse()
        .expect("Unknown model");

    println!("Using port: {} ({})", port_name, model);

    let config = SerialConfig::new(port_name, BAUD_RATE).expect("Invalid serial config");
    let port = SerialTransport::open(&config).expect("Failed to open serial port");

    let mut mono = Monochromator::new(model);
    if let Err(e) = mono.connect(port) {
        eprintln!("Connection failed: {}", e);
        if e.recommends_power_cycle() {
            eprintln!("Power cycle the monochromator and try again.");
        }
        std::process::exit(1);
    }

    // Homing takes over a minute
    if !mono.state().motors_initialized() {
        println!("Initializing motors...");
        mono.initialize_motors().unwrap();
    }

    let grating = mono.get_grating_index().unwrap();
    println!("Grating in use: {:?}", grating);
    if grating != GratingIndex::First {
        mono.move_grating_index(GratingIndex::First).unwrap();
        println!("Moved to grating {:?}", GratingIndex::First);
    }

    // Drive to the target wavelength and wait for the motors to stop
    mono.move_to(TARGET_WAVELENGTH_NM).unwrap();
    let policy = WaitPolicy::new(MillisDurationU32::secs(30), MillisDurationU32::millis(500));
    mono.wait_until_idle(&policy).unwrap();
    println!(
        "Wavelength: {:.3} nm",
        mono.get_wavelength_position().unwrap()
    );

    // Slits
    mono.move_slit_width(Slit::EntranceFront, ENTRANCE_SLIT_MM).unwrap();
    mono.move_slit_width(Slit::ExitFront, SlitTarget::Max).unwrap();
    for slit in [Slit::EntranceFront, Slit::ExitFront] {
        println!(
            "{:?}: {:.2} mm, {:.2} nm bandpass",
            slit,
            mono.get_slit_width(slit).unwrap(),
            mono.get_slit_bandwidth(slit).unwrap()
        );
    }

    mono.open_shutter().unwrap();
    println!("Shutter open");
    std::thread::sleep(std::time::Duration::from_secs(1));
    mono.close_shutter().unwrap();
    println!("Shutter closed");

    println!("\n--- Device state ---");
    println!("{:#?}", mono.state());
    mono.disconnect();
}
