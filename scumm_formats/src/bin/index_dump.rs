use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use scumm_formats::{DataArchive, IndexFile, RoomData};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Summarise SCUMM v5 index/data file pairs", version)]
struct Args {
    /// Index file to dump (may be passed multiple times)
    #[arg(long = "index", value_name = "PATH", conflicts_with = "root")]
    indexes: Vec<PathBuf>,

    /// Directory scanned recursively for `.000` index files
    #[arg(long = "root", value_name = "DIR", conflicts_with = "indexes")]
    root: Option<PathBuf>,

    /// Also parse every room block in the matching `.001` data file
    #[arg(long)]
    rooms: bool,

    /// Print the parsed index as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let indexes = resolve_index_paths(&args);
    if indexes.is_empty() {
        bail!("no index files to dump");
    }
    for path in indexes {
        if args.json {
            let index = IndexFile::open(&path)?;
            println!("{}", serde_json::to_string_pretty(&index)?);
            continue;
        }
        dump_index(&path, args.rooms)?;
    }
    Ok(())
}

fn resolve_index_paths(args: &Args) -> Vec<PathBuf> {
    if !args.indexes.is_empty() {
        return args.indexes.clone();
    }
    let Some(root) = args.root.as_ref() else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|res| res.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "000")
        })
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

fn dump_index(path: &Path, with_rooms: bool) -> Result<()> {
    let index = IndexFile::open(path)?;
    println!("{}", path.display());
    let m = &index.maxs;
    println!(
        "  vars {} bitvars {} local objects {} charsets {} inventory {}",
        m.num_variables, m.num_bit_variables, m.num_local_objects, m.num_charsets, m.num_inventory
    );
    for (label, dir) in [
        ("rooms", &index.rooms),
        ("scripts", &index.scripts),
        ("sounds", &index.sounds),
        ("costumes", &index.costumes),
        ("charsets", &index.charsets),
    ] {
        println!(
            "  {label:<9} {present:>5} present of {total:>5}",
            present = dir.present().count(),
            total = dir.len()
        );
    }
    println!("  objects   {:>5}", index.objects.len());
    for (room, name) in &index.room_names {
        println!("  room {room:>3} {name}");
    }

    if with_rooms {
        let data_path = path.with_extension("001");
        let archive = DataArchive::open(&data_path)
            .with_context(|| format!("opening data file for {}", path.display()))?;
        for &room in archive.room_offsets().keys() {
            let block = archive.read_room(room)?;
            let parsed =
                RoomData::parse(&block).with_context(|| format!("parsing room {room}"))?;
            println!(
                "  room {room:>3}: {}x{} objects {} local scripts {} boxes {} cycles {}",
                parsed.width,
                parsed.height,
                parsed.objects.len(),
                parsed.local_scripts.len(),
                parsed.boxes.len(),
                parsed.cycles.len()
            );
        }
    }
    Ok(())
}
