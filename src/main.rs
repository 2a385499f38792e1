use std::{env, error, fs, io::Read, process};

use emu::{Arm7tdmi, CoreConfig, CoreVersion, MemoryRange, Mode};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: armulator <image> [--base ADDR] [--entry ADDR] [--arm] [--arm9] \
                     [--ram-size BYTES] [--max-steps N] [--trace] [--log-file]";

const DEFAULT_BASE: u32 = 0x0800_0000;
const RAM_BASE: u32 = 0x0200_0000;
const DEFAULT_RAM_SIZE: u32 = 0x4_0000;
const VECTORS_SIZE: u32 = 0x20;

#[derive(Debug, PartialEq, Eq)]
struct Options {
    image: String,
    base: u32,
    entry: Option<u32>,
    arm: bool,
    arm9: bool,
    ram_size: u32,
    max_steps: Option<u64>,
    trace: bool,
    log_file: bool,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut image = None;
        let mut options = Self {
            image: String::new(),
            base: DEFAULT_BASE,
            entry: None,
            arm: false,
            arm9: false,
            ram_size: DEFAULT_RAM_SIZE,
            max_steps: None,
            trace: false,
            log_file: false,
        };

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| format!("{name} needs a value"))
                    .and_then(|v| parse_number(&v))
            };

            match arg.as_str() {
                "--base" => options.base = to_u32(value("--base")?)?,
                "--entry" => options.entry = Some(to_u32(value("--entry")?)?),
                "--ram-size" => options.ram_size = to_u32(value("--ram-size")?)?,
                "--max-steps" => options.max_steps = Some(value("--max-steps")?),
                "--arm" => options.arm = true,
                "--arm9" => options.arm9 = true,
                "--trace" => options.trace = true,
                "--log-file" => options.log_file = true,
                flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
                path if image.is_none() => image = Some(path.to_string()),
                extra => return Err(format!("unexpected argument {extra}")),
            }
        }

        options.image = image.ok_or_else(|| USAGE.to_string())?;
        Ok(options)
    }

    /// Entry address with bit 0 selecting the starting state.
    const fn entry_address(&self) -> u32 {
        let entry = match self.entry {
            Some(entry) => entry,
            None => self.base,
        };
        if self.arm { entry & !1 } else { entry | 1 }
    }

    fn config(&self) -> CoreConfig {
        let version = if self.arm9 {
            CoreVersion::Arm9
        } else {
            CoreVersion::Arm7tdmi
        };
        CoreConfig::default()
            .with_version(version)
            .with_max_instructions(self.max_steps)
    }

    fn ranges(&self, image: Vec<u8>) -> Vec<MemoryRange> {
        let size = u32::try_from(image.len()).unwrap_or(u32::MAX);
        let mut ranges = vec![
            MemoryRange::read_only("image", self.base, size).with_image(image),
            MemoryRange::read_write("ram", RAM_BASE, self.ram_size),
        ];
        if self.base >= VECTORS_SIZE {
            ranges.push(MemoryRange::read_only("vectors", 0, VECTORS_SIZE));
        }
        ranges
    }
}

fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {text}: {e}"))
}

fn to_u32(value: u64) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("0x{value:X} does not fit in 32 bits"))
}

/// Installs the subscriber: stderr by default, a file in the temp directory
/// with `--log-file`. `RUST_LOG` overrides the level picked by `--trace`.
fn init_logging(options: &Options) -> Option<WorkerGuard> {
    let default_level = if options.trace { "trace" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if options.log_file {
        let filename = format!("armulator-{}.log", process::id());
        let directory = env::temp_dir();
        println!("logging to file: {:?}", directory.join(&filename));

        let appender = tracing_appender::rolling::never(directory, filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

fn main() {
    println!("armulator v0.1.0");

    let options = match Options::parse(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let _guard = init_logging(&options);

    let data = match read_file(&options.image) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}: {e}", options.image);
            process::exit(2);
        }
    };
    println!("loaded {} bytes at 0x{:08X}", data.len(), options.base);

    let mut cpu = match Arm7tdmi::with_config(
        options.ranges(data),
        options.entry_address(),
        Mode::Supervisor,
        options.config(),
    ) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("{e}");
            process::exit(3);
        }
    };
    cpu.registers_mut()
        .set_stack_pointer(RAM_BASE.wrapping_add(options.ram_size));

    let result = cpu.run_until_halt();
    print!("{}", cpu.dump_registers());
    println!(
        "{} instructions, {} cycles",
        cpu.instructions_executed(),
        cpu.cycles()
    );

    if let Err(e) = result {
        let (address, word) = cpu.current_instruction();
        match word {
            Some(word) => eprintln!("stopped at 0x{address:08X} (0x{word:04X}): {e}"),
            None => eprintln!("stopped at 0x{address:08X}: {e}"),
        }
        process::exit(4);
    }
}

fn read_file(filepath: &str) -> Result<Vec<u8>, Box<dyn error::Error>> {
    let mut f = fs::File::open(filepath)?;
    let mut buf = vec![];
    f.read_to_end(&mut buf)?;

    Ok(buf)
}
