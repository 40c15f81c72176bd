//! Minimal reader for the circom R1CS binary header.
//!
//! Only the header section is parsed; the pipeline needs the constraint
//! count to size the parameter file, nothing more. Layout per the iden3
//! r1cs binary format: magic `r1cs`, u32 version, u32 section count, then
//! `(u32 type, u64 size)`-framed sections, header section type 1.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{anyhow, Context};
use forge_common::Result;

const R1CS_MAGIC: [u8; 4] = *b"r1cs";
const SECTION_HEADER: u32 = 1;

#[derive(Debug, Clone)]
pub struct R1csHeader {
    pub field_size: u32,
    pub n_wires: u32,
    pub n_pub_out: u32,
    pub n_pub_in: u32,
    pub n_prv_in: u32,
    pub n_labels: u64,
    pub n_constraints: u32,
}

pub fn read_r1cs_header(path: &Path) -> Result<R1csHeader> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("open r1cs {}", path.display()))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if magic != R1CS_MAGIC {
        return Err(anyhow!("not an r1cs file: {}", path.display()).into());
    }

    let _version = read_u32(&mut file)?;
    let n_sections = read_u32(&mut file)?;

    for _ in 0..n_sections {
        let section_type = read_u32(&mut file)?;
        let section_size = read_u64(&mut file)?;

        if section_type != SECTION_HEADER {
            file.seek(SeekFrom::Current(section_size as i64))?;
            continue;
        }

        let field_size = read_u32(&mut file)?;
        // Prime bytes, unused here.
        file.seek(SeekFrom::Current(field_size as i64))?;

        return Ok(R1csHeader {
            field_size,
            n_wires: read_u32(&mut file)?,
            n_pub_out: read_u32(&mut file)?,
            n_pub_in: read_u32(&mut file)?,
            n_prv_in: read_u32(&mut file)?,
            n_labels: read_u64(&mut file)?,
            n_constraints: read_u32(&mut file)?,
        });
    }

    Err(anyhow!("r1cs header section missing: {}", path.display()).into())
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
