use clap::Parser;
use rsp_sdr::sim::{SimApi, SimStream};
use rsp_sdr::{device, ApiSession, Direction, HardwareVersion, Kwargs, RspDevice};

#[derive(Parser, Debug)]
#[command(name = "rsp-control")]
#[command(about = "Drive an RSP receiver's control plane against the simulated vendor API")]
struct Cli {
    /// Receiver to simulate: rsp1, rsp1a, rsp2, rspduo, or a hardware id (1, 255, 2, 3)
    #[arg(long, default_value = "rsp1a")]
    hw: String,

    /// Serial number reported by the simulated receiver
    #[arg(long, default_value = "SIM0001")]
    serial: String,

    /// Device label, must contain "SDRplay3 Dev<index>"
    #[arg(long, default_value = "SDRplay3 Dev0")]
    label: String,

    /// RSPduo mode, e.g. "Tuner A (Single Tuner)" or "Dual Tuner"
    #[arg(long)]
    rspduo_mode: Option<String>,

    /// List attached receivers and exit
    #[arg(long)]
    list: bool,

    /// Start streaming before applying changes, so they reach the hardware
    #[arg(long)]
    stream: bool,

    /// RF frequency in Hz
    #[arg(short = 'f', long)]
    freq: Option<f64>,

    /// Frequency correction in ppm
    #[arg(long)]
    ppm: Option<f64>,

    /// Sample rate in Hz
    #[arg(short = 'r', long)]
    rate: Option<f64>,

    /// IF filter bandwidth in Hz
    #[arg(short = 'b', long)]
    bw: Option<f64>,

    /// IF mode: Zero-IF, 450kHz, 1620kHz, 2048kHz
    #[arg(long)]
    if_mode: Option<String>,

    /// Antenna name
    #[arg(short = 'a', long)]
    antenna: Option<String>,

    /// Gain element, NAME=VALUE (IFGR, RFGR); may be repeated
    #[arg(short = 'g', long = "gain", value_parser = parse_key_val)]
    gains: Vec<(String, String)>,

    /// Disable AGC
    #[arg(long)]
    manual_gain: bool,

    /// Device setting, KEY=VALUE; may be repeated
    #[arg(short = 'S', long = "setting", value_parser = parse_key_val)]
    settings: Vec<(String, String)>,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,

    /// Print every vendor API call made
    #[arg(long)]
    trace: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn parse_hw(name: &str) -> Option<HardwareVersion> {
    match name.to_ascii_lowercase().as_str() {
        "rsp1" => Some(HardwareVersion::Rsp1),
        "rsp1a" => Some(HardwareVersion::Rsp1a),
        "rsp2" => Some(HardwareVersion::Rsp2),
        "rspduo" => Some(HardwareVersion::RspDuo),
        other => other.parse().ok().and_then(HardwareVersion::from_id),
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let hw = parse_hw(&cli.hw).ok_or_else(|| format!("unknown receiver: {}", cli.hw))?;
    let sim = SimApi::new(vec![SimApi::device_info(hw, &cli.serial)]);
    let session = ApiSession::new(Box::new(sim.clone()));

    if cli.list {
        for args in device::enumerate(&session)? {
            let line: Vec<String> = args.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!("{}", line.join(", "));
        }
        return Ok(());
    }

    let mut args = Kwargs::new();
    args.insert("label".to_string(), cli.label.clone());
    if let Some(ref mode) = cli.rspduo_mode {
        args.insert("rspduo_mode".to_string(), mode.clone());
    }

    let dev = RspDevice::new(&session, &args, Box::new(SimStream::new()))?;
    log::info!(
        "opened {} {}",
        dev.hardware_version().name(),
        session.selected().unwrap_or_default()
    );

    if cli.stream {
        dev.activate_stream()?;
    }

    let rx = Direction::Rx;
    for (key, value) in &cli.settings {
        dev.write_setting(key, value)?;
    }
    if let Some(ref mode) = cli.if_mode {
        dev.write_setting("if_mode", mode)?;
    }
    if let Some(rate) = cli.rate {
        dev.set_sample_rate(rx, rate)?;
    }
    if let Some(bw) = cli.bw {
        dev.set_bandwidth(rx, bw)?;
    }
    if let Some(freq) = cli.freq {
        dev.set_frequency(rx, "RF", freq)?;
    }
    if let Some(ppm) = cli.ppm {
        dev.set_frequency(rx, "CORR", ppm)?;
    }
    if let Some(ref name) = cli.antenna {
        dev.set_antenna(rx, name)?;
    }
    if cli.manual_gain {
        dev.set_gain_mode(rx, false)?;
    }
    for (name, value) in &cli.gains {
        let value: f64 = value
            .parse()
            .map_err(|_| format!("bad gain value for {}: {}", name, value))?;
        dev.set_gain(rx, name, value)?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&dev.snapshot())?);
    } else {
        print_summary(&dev);
    }

    if cli.trace {
        for call in sim.calls() {
            println!("{:?}", call);
        }
    }
    Ok(())
}

fn print_summary(dev: &RspDevice) {
    let rx = Direction::Rx;
    println!("driver:      {}", dev.driver_key());
    println!("hardware:    {} ({})", dev.hardware_version().name(), dev.hardware_key());
    for (key, value) in dev.hardware_info() {
        println!("  {}: {}", key, value);
    }
    println!("channels:    {}", dev.num_channels(rx));
    println!("antenna:     {}", dev.antenna(rx));
    println!("frequency:   {} Hz", dev.frequency(rx, "RF"));
    println!("correction:  {} ppm", dev.frequency(rx, "CORR"));
    println!("sample rate: {} Hz", dev.sample_rate(rx));
    println!("bandwidth:   {} Hz", dev.bandwidth(rx));
    println!(
        "gain:        IFGR {} dB, RFGR {}, AGC {}",
        dev.gain(rx, "IFGR"),
        dev.gain(rx, "RFGR"),
        if dev.gain_mode(rx) { "on" } else { "off" }
    );
    println!("streaming:   {}", dev.is_streaming());
    for key in dev.setting_keys() {
        println!("  {} = {}", key, dev.read_setting(key));
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
