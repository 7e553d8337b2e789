use std::env;
use std::fs;

use anyhow::{Context, Result};
use scumm_formats::{WizImage, wiz_histogram};

fn main() -> Result<()> {
    let path = env::args().nth(1).context("usage: wiz_dump <AWIZ file>")?;
    let bytes = fs::read(&path).with_context(|| format!("reading {path}"))?;
    let image = WizImage::parse(&bytes).with_context(|| format!("parsing {path}"))?;
    println!(
        "{path}: {}x{} compression {} palette {} spot {:?} remap {} transparent {:?}",
        image.width,
        image.height,
        image.compression,
        image.palette.is_some(),
        image.spot,
        image.remap.is_some(),
        image.transparent
    );

    let counts = wiz_histogram(&image, image.bounds())?;
    for (color, count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
        println!("  colour {color:>3}: {count}");
    }
    Ok(())
}
