use std::path::PathBuf;

use clap::Parser;
use pereflect::{PeFile, PeFileProvider};
use pereflect::export::ImageExport;
use pereflect::resource::{ImageResourceDirectoryLevel, ResourceChild};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;


#[derive(Parser)]
enum ProgMode {
    Headers(InputFileArgs),
    Sections(InputFileArgs),
    Exports(InputFileArgs),
    Imports(InputFileArgs),
    Debug(InputFileArgs),
    Resources(InputFileArgs),
    Version(InputFileArgs),
    Clr(InputFileArgs),
    Json(InputFileArgs),
    Rva(RvaArgs),
}

#[derive(Parser)]
struct InputFileArgs {
    /// Treat the input as an image laid out the way the loader maps it.
    #[arg(long)]
    pub loaded: bool,

    pub input_file: PathBuf,
}

#[derive(Parser)]
struct RvaArgs {
    #[arg(long)]
    pub loaded: bool,

    pub input_file: PathBuf,

    /// Decimal, or hexadecimal with a 0x prefix.
    #[arg(value_parser = parse_rva)]
    pub rva: u32,
}


fn parse_rva(text: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|e| e.to_string())
}

fn open(args: &InputFileArgs) -> PeFile {
    debug!("opening {} (loaded layout: {})", args.input_file.display(), args.loaded);
    let pe = PeFileProvider::open(&args.input_file, args.loaded)
        .expect("failed to parse PE file");
    info!(
        "parsed {}: {} sections, {} exports, {} imports",
        args.input_file.display(),
        pe.section_headers().len(),
        pe.export_directory.as_ref().map(|e| e.exports.len()).unwrap_or(0),
        pe.import_descriptors.len(),
    );
    pe
}

fn print_resource_level(level: &ImageResourceDirectoryLevel, indent: usize) {
    for entry in &level.entries {
        let label = match (entry.name(), entry.id()) {
            (Some(name), _) => format!("{:?}", name),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => "?".to_owned(),
        };
        match &entry.child {
            ResourceChild::Directory(subdirectory) => {
                println!("{:indent$}{}", "", label, indent = indent);
                print_resource_level(subdirectory, indent + 2);
            },
            ResourceChild::Data(data) => {
                let offset = data.data_offset
                    .map(|o| format!("{:#X}", o))
                    .unwrap_or_else(|| "unmapped".to_owned());
                println!(
                    "{:indent$}{}: RVA {:#010X}, {} bytes, code page {}, offset {}",
                    "", label, data.offset_to_data, data.size, data.code_page, offset,
                    indent = indent,
                );
            },
        }
    }
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mode = ProgMode::parse();
    match mode {
        ProgMode::Headers(args) => {
            let pe = open(&args);
            println!("{:#?}", pe.file_header());
            match pe.optional_header() {
                Some(optional_header) => println!("{:#?}", optional_header),
                None => println!("no optional header (COFF object)"),
            }
        },
        ProgMode::Sections(args) => {
            let pe = open(&args);
            for (index, section) in pe.section_headers().iter().enumerate() {
                println!(
                    "{:2} {:8} RVA {:#010X} size {:#010X} raw {:#010X} size {:#010X} {:?}",
                    index, section.name(), section.virtual_address, section.virtual_size,
                    section.pointer_to_raw_data, section.size_of_raw_data, section.characteristics,
                );
            }
        },
        ProgMode::Exports(args) => {
            let pe = open(&args);
            let Some(export_directory) = &pe.export_directory else {
                println!("no exports");
                return;
            };
            if let Some(module_name) = &export_directory.module_name {
                println!("{}", module_name);
            }
            for export in &export_directory.exports {
                match export {
                    ImageExport::Code(e) => println!("{:5} {:#018X} {}", e.ordinal, e.address, e.name),
                    ImageExport::Forwarded(e) => println!("{:5} {:>18} {} -> {}", e.ordinal, "forwarded", e.name, e.target_function),
                }
            }
        },
        ProgMode::Imports(args) => {
            let pe = open(&args);
            for import in &pe.import_descriptors {
                println!(
                    "{} (lookup table {:#010X}, address table {:#010X})",
                    import.name.as_deref().unwrap_or("?"),
                    import.descriptor.original_first_thunk,
                    import.descriptor.first_thunk,
                );
            }
        },
        ProgMode::Debug(args) => {
            let pe = open(&args);
            for entry in &pe.debug_directory {
                println!("{:#?}", entry.directory);
                if let Some(code_view) = &entry.code_view {
                    println!("  PDB {} {} age {}", code_view.path, code_view.signature, code_view.age);
                }
            }
        },
        ProgMode::Resources(args) => {
            let pe = open(&args);
            print_resource_level(&pe.resource_directory.root, 0);
        },
        ProgMode::Version(args) => {
            let pe = open(&args);
            match pe.version_info() {
                Some(version_info) => {
                    println!("file version {}", version_info.file_version());
                    println!("product version {}", version_info.product_version());
                    println!("{:#?}", version_info.fixed_file_info);
                },
                None => println!("no version information"),
            }
        },
        ProgMode::Clr(args) => {
            let pe = open(&args);
            match &pe.cor20_header {
                Some(header) => println!("{:#?}", header),
                None => println!("no COR20 header"),
            }
        },
        ProgMode::Json(args) => {
            let pe = open(&args);
            let json = serde_json::to_string_pretty(&pe)
                .expect("failed to serialize PE file");
            println!("{}", json);
        },
        ProgMode::Rva(args) => {
            debug!("translating RVA {:#010X} in {}", args.rva, args.input_file.display());
            let pe = PeFileProvider::open(&args.input_file, args.loaded)
                .expect("failed to parse PE file");
            match (pe.section_containing(args.rva), pe.try_offset(args.rva)) {
                (Some(index), Some(offset)) => {
                    let section = &pe.section_headers()[index];
                    println!("RVA {:#010X} -> offset {:#X} (section {} {})", args.rva, offset, index, section.name());
                },
                _ => println!("RVA {:#010X} is not contained in any section", args.rva),
            }
        },
    }
}
