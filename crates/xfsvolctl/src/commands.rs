use std::io::Write;

use anyhow::{Context, Result};

use xfsvol_core::{Volume, VolumeManager, format_human_size};

const HEADERS: [&str; 3] = ["NAME", "BLK-QUOTA", "INODE-QUOTA"];

pub fn ls(manager: &VolumeManager, out: &mut impl Write) -> Result<()> {
    let volumes = manager.list().context("couldn't list volumes")?;
    out.write_all(render_table(&volumes).as_bytes())?;
    Ok(())
}

pub fn create(
    manager: &mut VolumeManager,
    name: &str,
    size: u64,
    inodes: Option<u64>,
    out: &mut impl Write,
) -> Result<()> {
    let path = manager
        .create(name, size, inodes)
        .with_context(|| format!("couldn't create volume {name}"))?;
    writeln!(out, "{}", path.display())?;
    Ok(())
}

pub fn delete(manager: &mut VolumeManager, name: &str) -> Result<()> {
    manager
        .delete(name)
        .with_context(|| format!("couldn't delete volume {name}"))
}

/// Left-aligned columns separated by at least two spaces.
fn render_table(volumes: &[Volume]) -> String {
    let rows: Vec<[String; 3]> = volumes
        .iter()
        .map(|v| [v.name.clone(), format_human_size(v.size), v.inodes.to_string()])
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut table = String::new();
    let header = HEADERS.map(str::to_string);
    for row in std::iter::once(&header).chain(&rows) {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}  ", width = widths[i]));
            }
        }
        table.push_str(line.trim_end());
        table.push('\n');
    }
    table
}
