//! refl-archive CLI - Inspect and convert MessagePack archives.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process;

use memmap2::Mmap;
use refl_archive::archive::{transcode, Reader};
use refl_archive::json::{JsonReader, JsonWriter};
use refl_archive::msgpack::{MsgpackReader, MsgpackWriter};
use refl_archive::{EntityKind, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Longest string value shown by `info`.
const MAX_PREVIEW: usize = 48;

/// Input file contents. Empty files cannot be mapped.
enum Input {
    Mapped(Mmap),
    Empty,
}

impl Input {
    fn open(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Ok(Self::Empty);
        }
        // Safety: the file is opened read-only and not modified while mapped
        let mmap = unsafe { Mmap::map(&file) }?;
        debug!(path, size, "mapped input");
        Ok(Self::Mapped(mmap))
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => &m[..],
            Self::Empty => &[],
        }
    }
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("refl_archive={}", level)));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        // Info command - show entity tree
        "info" | "i" => match filtered_args.get(1) {
            Some(path) => cmd_info(path),
            None => usage("refl-archive info <file.msgpack>"),
        },

        // Dump command - MessagePack to JSON
        "dump" | "d" => match filtered_args.get(1) {
            Some(path) => cmd_dump(path),
            None => usage("refl-archive dump <file.msgpack>"),
        },

        // Encode command - JSON to MessagePack
        "encode" | "e" => match (filtered_args.get(1), filtered_args.get(2)) {
            (Some(input), Some(output)) => cmd_encode(input, output),
            _ => usage("refl-archive encode <in.json> <out.msgpack>"),
        },

        "version" | "-V" | "--version" => {
            print_version();
            Ok(())
        }

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_help();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn usage(line: &str) -> ! {
    eprintln!("Error: missing argument");
    eprintln!("Usage: {}", line);
    process::exit(1);
}

fn print_version() {
    println!(
        "refl-archive {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("REFL_ARCHIVE_BUILD_DATE")
    );
}

fn print_help() {
    print_version();
    println!();
    println!("USAGE:");
    println!("    refl-archive [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file>              Show the entity tree of a MessagePack file");
    println!("    d, dump   <file>              Print a MessagePack file as JSON");
    println!("    e, encode <in.json> <out>     Convert a JSON document to MessagePack");
    println!("    version                       Show version and build date");
    println!("    h, help                       Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("RUST_LOG overrides the verbosity options.");
}

// ============================================================================
// info
// ============================================================================

fn cmd_info(path: &str) -> Result<()> {
    info!(path, "opening archive");
    let input = Input::open(path)?;
    let bytes = input.bytes();
    let mut reader = MsgpackReader::new(bytes);

    println!("Archive: {} ({} bytes)", path, bytes.len());
    let mut values = 0usize;
    while reader.position() < bytes.len() as u64 {
        print_entity(&mut reader, 1, &format!("[{}]", values))?;
        values += 1;
    }
    println!();
    println!("Top-level values: {}", values);
    Ok(())
}

fn print_entity(r: &mut MsgpackReader<&[u8]>, depth: usize, label: &str) -> Result<()> {
    let indent = "  ".repeat(depth);
    let offset = r.position();
    let kind = r.type_next()?;

    match kind {
        EntityKind::Object | EntityKind::Dictionary => {
            let scope = r.begin_object()?;
            let entries = r.elem_left().unwrap_or(0) / 2;
            println!("{}{} {} ({} entries) @{}", indent, label, kind, entries, offset);
            while !r.should_break(&scope) {
                r.read_key_next()?;
                let key = read_key(r)?;
                print_entity(r, depth + 1, &key)?;
            }
            r.end_object(scope)
        }
        EntityKind::Array | EntityKind::Tuple => {
            let scope = r.begin_array()?;
            let elems = r.elem_left().unwrap_or(0);
            println!("{}{} {} ({} elements) @{}", indent, label, kind, elems, offset);
            let mut index = 0usize;
            while !r.should_break(&scope) {
                print_entity(r, depth + 1, &format!("[{}]", index))?;
                index += 1;
            }
            r.end_array(scope)
        }
        EntityKind::Binary => {
            let len = r.begin_binary()?;
            println!("{}{} binary ({} bytes) @{}", indent, label, len, offset);
            r.end_binary()
        }
        EntityKind::Null => {
            r.read_null()?;
            println!("{}{} null @{}", indent, label, offset);
            Ok(())
        }
        EntityKind::Boolean => {
            let v = r.read_bool()?;
            println!("{}{} boolean = {} @{}", indent, label, v, offset);
            Ok(())
        }
        EntityKind::Integer | EntityKind::FloatingPoint => {
            let n = r.read_number()?;
            println!("{}{} {} = {} @{}", indent, label, kind, n, offset);
            Ok(())
        }
        EntityKind::String => {
            let mut s = String::new();
            r.read_string(&mut s)?;
            println!("{}{} string = {:?} @{}", indent, label, preview(&s), offset);
            Ok(())
        }
        EntityKind::Invalid => {
            r.skip_value()?;
            println!("{}{} extension (skipped) @{}", indent, label, offset);
            Ok(())
        }
    }
}

/// Read an object key of any scalar kind as display text.
fn read_key(r: &mut MsgpackReader<&[u8]>) -> Result<String> {
    match r.type_next()? {
        EntityKind::String => {
            let mut s = String::new();
            r.read_string(&mut s)?;
            Ok(s)
        }
        EntityKind::Integer | EntityKind::FloatingPoint => Ok(r.read_number()?.to_string()),
        EntityKind::Boolean => Ok(r.read_bool()?.to_string()),
        kind => {
            r.skip_value()?;
            Ok(format!("<{}>", kind))
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() <= MAX_PREVIEW {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_PREVIEW).collect();
    out.push_str("...");
    out
}

// ============================================================================
// dump / encode
// ============================================================================

fn cmd_dump(path: &str) -> Result<()> {
    info!(path, "dumping archive");
    let input = Input::open(path)?;
    let bytes = input.bytes();
    let mut reader = MsgpackReader::new(bytes);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while reader.position() < bytes.len() as u64 {
        let mut writer = JsonWriter::new();
        transcode(&mut reader, &mut writer)?;
        let value = writer.into_value()?;
        let text = serde_json::to_string_pretty(&value).map_err(std::io::Error::from)?;
        writeln!(out, "{}", text)?;
    }
    Ok(())
}

fn cmd_encode(input: &str, output: &str) -> Result<()> {
    info!(input, output, "encoding JSON");
    let text = std::fs::read_to_string(input)?;
    let mut reader = JsonReader::parse(&text)?;

    let file = File::create(output)?;
    let mut writer = MsgpackWriter::new(BufWriter::new(file));
    transcode(&mut reader, &mut writer)?;
    let written = writer.position();
    let mut sink = writer.into_inner()?;
    sink.flush()?;

    info!(bytes = written, "wrote {}", output);
    Ok(())
}
