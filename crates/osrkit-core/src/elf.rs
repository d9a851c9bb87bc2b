//! `DT_NEEDED` inspection for ELF shared objects.
//!
//! Used to check which dependencies of a plugin binary the priming list
//! covers before attempting a load on device.

use std::path::Path;

use thiserror::Error;

use crate::config::LoaderConfig;
use crate::redirect::NameRedirector;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;

const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_STRSZ: u64 = 10;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an ELF file")]
    NotElf,

    #[error("unsupported ELF class {0}")]
    UnsupportedClass(u8),

    #[error("unsupported ELF data encoding {0}")]
    UnsupportedEncoding(u8),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("no PT_DYNAMIC segment")]
    NoDynamicSegment,

    #[error("no DT_STRTAB entry")]
    NoStringTable,

    #[error("string table address {0:#x} is not mapped by any PT_LOAD segment")]
    UnmappedStringTable(u64),

    #[error("dependency name is not valid UTF-8")]
    InvalidName,
}

/// Field reader honoring the file's class and byte order.
struct Reader<'a> {
    data: &'a [u8],
    is_64: bool,
    little: bool,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, ElfError> {
        if data.len() < 16 || &data[..4] != b"\x7fELF" {
            return Err(ElfError::NotElf);
        }
        let is_64 = match data[4] {
            1 => false,
            2 => true,
            other => return Err(ElfError::UnsupportedClass(other)),
        };
        let little = match data[5] {
            1 => true,
            2 => false,
            other => return Err(ElfError::UnsupportedEncoding(other)),
        };
        Ok(Self { data, is_64, little })
    }

    fn bytes<const N: usize>(&self, offset: u64, what: &'static str) -> Result<[u8; N], ElfError> {
        let start = usize::try_from(offset).map_err(|_| ElfError::Truncated(what))?;
        let end = start.checked_add(N).ok_or(ElfError::Truncated(what))?;
        let slice = self.data.get(start..end).ok_or(ElfError::Truncated(what))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u16(&self, offset: u64, what: &'static str) -> Result<u16, ElfError> {
        let b = self.bytes::<2>(offset, what)?;
        Ok(if self.little { u16::from_le_bytes(b) } else { u16::from_be_bytes(b) })
    }

    fn u32(&self, offset: u64, what: &'static str) -> Result<u32, ElfError> {
        let b = self.bytes::<4>(offset, what)?;
        Ok(if self.little { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
    }

    fn u64(&self, offset: u64, what: &'static str) -> Result<u64, ElfError> {
        let b = self.bytes::<8>(offset, what)?;
        Ok(if self.little { u64::from_le_bytes(b) } else { u64::from_be_bytes(b) })
    }

    /// Address-sized field.
    fn word(&self, offset: u64, what: &'static str) -> Result<u64, ElfError> {
        if self.is_64 {
            self.u64(offset, what)
        } else {
            self.u32(offset, what).map(u64::from)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    kind: u32,
    offset: u64,
    vaddr: u64,
    filesz: u64,
}

fn segments(r: &Reader<'_>) -> Result<Vec<Segment>, ElfError> {
    let (phoff, phentsize, phnum) = if r.is_64 {
        (
            r.u64(0x20, "ELF header")?,
            r.u16(0x36, "ELF header")?,
            r.u16(0x38, "ELF header")?,
        )
    } else {
        (
            u64::from(r.u32(0x1c, "ELF header")?),
            r.u16(0x2a, "ELF header")?,
            r.u16(0x2c, "ELF header")?,
        )
    };

    let mut out = Vec::with_capacity(usize::from(phnum));
    for i in 0..u64::from(phnum) {
        let base = phoff
            .checked_add(i * u64::from(phentsize))
            .ok_or(ElfError::Truncated("program headers"))?;
        let what = "program header";
        let segment = if r.is_64 {
            Segment {
                kind: r.u32(base, what)?,
                offset: r.u64(base.saturating_add(8), what)?,
                vaddr: r.u64(base.saturating_add(16), what)?,
                filesz: r.u64(base.saturating_add(32), what)?,
            }
        } else {
            Segment {
                kind: r.u32(base, what)?,
                offset: u64::from(r.u32(base.saturating_add(4), what)?),
                vaddr: u64::from(r.u32(base.saturating_add(8), what)?),
                filesz: u64::from(r.u32(base.saturating_add(16), what)?),
            }
        };
        out.push(segment);
    }
    Ok(out)
}

fn read_cstr(r: &Reader<'_>, offset: u64, limit: Option<u64>) -> Result<String, ElfError> {
    let start = usize::try_from(offset).map_err(|_| ElfError::Truncated("string table"))?;
    let tail = r.data.get(start..).ok_or(ElfError::Truncated("string table"))?;
    let tail = match limit.and_then(|l| usize::try_from(l).ok()) {
        Some(l) if l < tail.len() => &tail[..l],
        _ => tail,
    };
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(ElfError::Truncated("string table"))?;
    std::str::from_utf8(&tail[..len])
        .map(str::to_string)
        .map_err(|_| ElfError::InvalidName)
}

/// `DT_NEEDED` entries of an in-memory ELF image, in file order.
pub fn needed_libraries(data: &[u8]) -> Result<Vec<String>, ElfError> {
    let r = Reader::new(data)?;
    let segments = segments(&r)?;
    let dynamic = segments
        .iter()
        .find(|s| s.kind == PT_DYNAMIC)
        .ok_or(ElfError::NoDynamicSegment)?;

    let entry_size: u64 = if r.is_64 { 16 } else { 8 };
    let word_size: u64 = entry_size / 2;
    let mut strtab_addr = None;
    let mut strtab_size = None;
    let mut needed_offsets = Vec::new();

    for i in 0..dynamic.filesz / entry_size {
        let at = dynamic.offset.saturating_add(i * entry_size);
        let tag = r.word(at, "dynamic section")?;
        let value = r.word(at.saturating_add(word_size), "dynamic section")?;
        match tag {
            DT_NULL => break,
            DT_NEEDED => needed_offsets.push(value),
            DT_STRTAB => strtab_addr = Some(value),
            DT_STRSZ => strtab_size = Some(value),
            _ => {}
        }
    }

    if needed_offsets.is_empty() {
        return Ok(Vec::new());
    }

    let strtab_addr = strtab_addr.ok_or(ElfError::NoStringTable)?;
    let strtab_offset = segments
        .iter()
        .filter(|s| s.kind == PT_LOAD)
        .find(|s| s.vaddr <= strtab_addr && strtab_addr < s.vaddr.saturating_add(s.filesz))
        .and_then(|s| s.offset.checked_add(strtab_addr - s.vaddr))
        .ok_or(ElfError::UnmappedStringTable(strtab_addr))?;

    needed_offsets
        .into_iter()
        .map(|name_offset| {
            let limit = strtab_size.map(|size| size.saturating_sub(name_offset));
            let at = strtab_offset
                .checked_add(name_offset)
                .ok_or(ElfError::Truncated("string table"))?;
            read_cstr(&r, at, limit)
        })
        .collect()
}

/// `DT_NEEDED` entries of the ELF file at `path`.
pub fn read_needed(path: impl AsRef<Path>) -> Result<Vec<String>, ElfError> {
    let data = std::fs::read(path.as_ref())?;
    needed_libraries(&data)
}

/// Dependencies that neither appear in nor redirect into the priming list.
pub fn unprimed_dependencies(needed: &[String], config: &LoaderConfig) -> Vec<String> {
    let redirector = NameRedirector::builtin().with_entries(&config.extra_redirects);
    let primed: Vec<&str> = config
        .auxiliary_libraries
        .iter()
        .map(|name| redirector.redirect(name))
        .collect();

    needed
        .iter()
        .filter(|name| {
            let actual = redirector.redirect(name);
            !primed.contains(&name.as_str()) && !primed.contains(&actual)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_VADDR: u64 = 0x1000;

    fn put(buf: &mut [u8], offset: usize, value: u64, width: usize, little: bool) {
        let bytes = value.to_le_bytes();
        for i in 0..width {
            let b = bytes[i];
            let at = if little { offset + i } else { offset + width - 1 - i };
            buf[at] = b;
        }
    }

    /// Minimal shared object with one PT_LOAD covering the file, one
    /// PT_DYNAMIC, and the given DT_NEEDED names.
    fn build_elf(is_64: bool, little: bool, needed: &[&str]) -> Vec<u8> {
        let (ehsize, phentsize, word) = if is_64 { (64, 56, 8) } else { (52, 32, 4) };
        let phoff = ehsize;
        let strtab_off = phoff + 2 * phentsize;

        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for name in needed {
            name_offsets.push(strtab.len() as u64);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let dyn_off = (strtab_off + strtab.len() + 7) & !7;
        let mut entries: Vec<(u64, u64)> = name_offsets.iter().map(|&o| (DT_NEEDED, o)).collect();
        entries.push((DT_STRTAB, BASE_VADDR + strtab_off as u64));
        entries.push((DT_STRSZ, strtab.len() as u64));
        entries.push((DT_NULL, 0));
        let dyn_size = entries.len() * word * 2;
        let total = dyn_off + dyn_size;

        let mut buf = vec![0u8; total];
        buf[..4].copy_from_slice(b"\x7fELF");
        buf[4] = if is_64 { 2 } else { 1 };
        buf[5] = if little { 1 } else { 2 };
        buf[6] = 1;

        let phdrs = [
            (PT_LOAD, 0u64, BASE_VADDR, total as u64),
            (PT_DYNAMIC, dyn_off as u64, BASE_VADDR + dyn_off as u64, dyn_size as u64),
        ];
        if is_64 {
            put(&mut buf, 0x20, phoff as u64, 8, little);
            put(&mut buf, 0x36, phentsize as u64, 2, little);
            put(&mut buf, 0x38, phdrs.len() as u64, 2, little);
        } else {
            put(&mut buf, 0x1c, phoff as u64, 4, little);
            put(&mut buf, 0x2a, phentsize as u64, 2, little);
            put(&mut buf, 0x2c, phdrs.len() as u64, 2, little);
        }
        for (i, (kind, offset, vaddr, filesz)) in phdrs.iter().enumerate() {
            let base = phoff + i * phentsize;
            put(&mut buf, base, u64::from(*kind), 4, little);
            if is_64 {
                put(&mut buf, base + 8, *offset, 8, little);
                put(&mut buf, base + 16, *vaddr, 8, little);
                put(&mut buf, base + 32, *filesz, 8, little);
            } else {
                put(&mut buf, base + 4, *offset, 4, little);
                put(&mut buf, base + 8, *vaddr, 4, little);
                put(&mut buf, base + 16, *filesz, 4, little);
            }
        }

        buf[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);
        for (i, (tag, value)) in entries.iter().enumerate() {
            let at = dyn_off + i * word * 2;
            put(&mut buf, at, *tag, word, little);
            put(&mut buf, at + word, *value, word, little);
        }
        buf
    }

    #[test]
    fn test_needed_elf64_little_endian() {
        let image = build_elf(true, true, &["libc.so", "libiGraphicsCore.huawei.so"]);
        let needed = needed_libraries(&image).unwrap();
        assert_eq!(needed, vec!["libc.so", "libiGraphicsCore.huawei.so"]);
    }

    #[test]
    fn test_needed_elf32_big_endian() {
        let image = build_elf(false, false, &["libm.so", "liblog.so", "libdl.so"]);
        let needed = needed_libraries(&image).unwrap();
        assert_eq!(needed, vec!["libm.so", "liblog.so", "libdl.so"]);
    }

    #[test]
    fn test_no_dependencies() {
        let image = build_elf(true, true, &[]);
        assert!(needed_libraries(&image).unwrap().is_empty());
    }

    #[test]
    fn test_not_elf() {
        assert!(matches!(needed_libraries(b"#!/bin/sh\n"), Err(ElfError::NotElf)));
    }

    #[test]
    fn test_truncated_image_is_an_error() {
        let image = build_elf(true, true, &["libc.so"]);
        let result = needed_libraries(&image[..80]);
        assert!(matches!(result, Err(ElfError::Truncated(_))));
    }

    #[test]
    fn test_overflowing_load_offset_is_an_error() {
        let mut image = build_elf(true, true, &["libc.so"]);
        // p_offset of the PT_LOAD header
        put(&mut image, 64 + 8, u64::MAX, 8, true);
        let result = needed_libraries(&image);
        assert!(matches!(result, Err(ElfError::UnmappedStringTable(_))));
    }

    #[test]
    fn test_overflowing_dynamic_offset_is_an_error() {
        let mut image = build_elf(true, true, &["libc.so"]);
        // p_offset of the PT_DYNAMIC header
        put(&mut image, 64 + 56 + 8, u64::MAX, 8, true);
        let result = needed_libraries(&image);
        assert!(matches!(result, Err(ElfError::Truncated(_))));
    }

    #[test]
    fn test_bad_class() {
        let mut image = build_elf(true, true, &["libc.so"]);
        image[4] = 9;
        assert!(matches!(needed_libraries(&image), Err(ElfError::UnsupportedClass(9))));
    }

    #[test]
    fn test_unprimed_dependencies_follow_redirects() {
        let config = LoaderConfig::default();
        let needed = vec![
            "libiGraphicsCore.huawei.so".to_string(),
            "libai_client.so".to_string(),
            "libvendor_private.so".to_string(),
        ];
        assert_eq!(
            unprimed_dependencies(&needed, &config),
            vec!["libvendor_private.so"]
        );
    }

    #[test]
    fn test_read_needed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libplugin.so");
        std::fs::write(&path, build_elf(true, true, &["libc.so"])).unwrap();
        assert_eq!(read_needed(&path).unwrap(), vec!["libc.so"]);
    }
}
