//! Order-file codec
//!
//! The order file is the stable contract between a dump run and a later load
//! run, so the format is deliberately dumb: line-based UTF-8.
//!
//! ```text
//! file    := line*
//! line    := comment | method | cluster | blank
//! comment := '#' .* '\n'
//! method  := 'M' ' ' decimal ' ' klass ' ' name ' ' sig '\n'
//! cluster := 'C' '\n'
//! klass   := slash-separated internal form
//! ```
//!
//! Loading is two passes over the same file: pass 1 ([`scan_order_file`])
//! only counts methods and sums their padded code sizes so the reserved
//! segment can be sized before anything else is initialized; pass 2
//! ([`load_order_file`]) interns the symbols and rebuilds the order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::trace;

use crate::domain::{MethodKey, OrderEntry, OrderFileError, OrderedMethod, SymbolTable};

/// Longest accepted order line, in bytes.
pub const MAX_LINE_LEN: usize = 8192;

/// Pass-1 result: enough to size the reserved hot segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderScan {
    pub method_count: usize,
    /// Sum of per-method sizes, each padded up to the code-cache grain
    pub total_code_size: u64,
}

/// Round `size` up to the code-cache allocation grain.
#[must_use]
pub fn pad_to_grain(size: u64, grain: u64) -> u64 {
    if grain == 0 {
        return size;
    }
    size.div_ceil(grain) * grain
}

fn read_lines(path: &Path) -> Result<Vec<String>, OrderFileError> {
    if !path.exists() {
        return Err(OrderFileError::Missing(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.len() > MAX_LINE_LEN {
            return Err(OrderFileError::LineTooLong {
                line_no: i + 1,
                limit: MAX_LINE_LEN,
            });
        }
        lines.push(line);
    }
    Ok(lines)
}

/// Pass 1: count method lines and sum their padded sizes.
///
/// Only `M ` lines are examined; a method line whose size field does not
/// parse is a hard error, everything else is left for pass 2 to judge.
pub fn scan_order_file(path: &Path, grain: u64) -> Result<OrderScan, OrderFileError> {
    let mut method_count = 0usize;
    let mut total_code_size = 0u64;

    for (i, line) in read_lines(path)?.iter().enumerate() {
        if line.len() <= 2 || !line.starts_with("M ") {
            continue;
        }
        let rest = &line[2..];
        let size_token = rest.split(' ').next().unwrap_or("");
        let size: u64 = size_token.parse().map_err(|_| OrderFileError::Malformed {
            line_no: i + 1,
            line: line.clone(),
        })?;
        method_count += 1;
        total_code_size += pad_to_grain(size, grain);
    }

    trace!(
        "order file scanned: method_cnt={method_count}, estimated_segment_size={total_code_size}"
    );
    Ok(OrderScan {
        method_count,
        total_code_size,
    })
}

fn parse_method_line(
    line: &str,
    line_no: usize,
    symbols: &mut SymbolTable,
) -> Result<OrderedMethod, OrderFileError> {
    let malformed = || OrderFileError::Malformed {
        line_no,
        line: line.to_string(),
    };

    let rest = line.strip_prefix("M ").ok_or_else(malformed)?;
    let (size_token, rest) = rest.split_once(' ').ok_or_else(malformed)?;
    let size: u32 = size_token.parse().map_err(|_| malformed())?;

    // Accept dotted class names from hand-edited files
    let rest = rest.replace('.', "/");
    let (klass, rest) = rest.split_once(' ').ok_or_else(malformed)?;
    let (name, sig) = rest.split_once(' ').ok_or_else(malformed)?;
    if klass.is_empty() || name.is_empty() || sig.is_empty() || sig.contains(' ') {
        return Err(malformed());
    }

    let key = MethodKey::intern(symbols, klass, name, sig);
    trace!("hot method init: key={{{key}}}");
    Ok(OrderedMethod { key, size })
}

/// Pass 2: rebuild the full order, boundaries included.
///
/// Comments and blank lines are dropped; an unknown line prefix or a
/// duplicated method key is a hard error.
pub fn load_order_file(
    path: &Path,
    symbols: &mut SymbolTable,
) -> Result<Vec<OrderEntry>, OrderFileError> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (i, line) in read_lines(path)?.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        match line.as_bytes()[0] {
            b'#' => {}
            b'C' if line.trim_end() == "C" => order.push(OrderEntry::ClusterBoundary),
            b'M' => {
                let method = parse_method_line(line, i + 1, symbols)?;
                if !seen.insert(method.key.clone()) {
                    return Err(OrderFileError::DuplicateMethod(method.key));
                }
                order.push(OrderEntry::Method(method));
            }
            _ => {
                return Err(OrderFileError::Malformed {
                    line_no: i + 1,
                    line: line.clone(),
                })
            }
        }
    }

    Ok(order)
}

/// Serialize an order. Boundaries become bare `C` lines; the leading
/// boundary the sorter emits is written like any other.
pub fn write_order<W: Write>(order: &[OrderEntry], mut out: W) -> std::io::Result<()> {
    for entry in order {
        match entry {
            OrderEntry::ClusterBoundary => writeln!(out, "C")?,
            OrderEntry::Method(m) => {
                writeln!(out, "M {} {} {} {}", m.size, m.key.klass(), m.key.name(), m.key.sig())?;
            }
        }
    }
    Ok(())
}

/// Write an order to `path`, creating or truncating the file.
pub fn write_order_file(path: &Path, order: &[OrderEntry]) -> Result<(), OrderFileError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_order(order, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(symbols: &mut SymbolTable) -> Vec<OrderEntry> {
        let m = |symbols: &mut SymbolTable, name: &str, size: u32| {
            OrderEntry::Method(OrderedMethod {
                key: MethodKey::intern(symbols, "java/util/HashMap", name, "()I"),
                size,
            })
        };
        vec![
            OrderEntry::ClusterBoundary,
            m(symbols, "hash", 320),
            m(symbols, "resize", 1280),
            OrderEntry::ClusterBoundary,
            m(symbols, "size", 48),
            OrderEntry::ClusterBoundary,
        ]
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_write_emits_method_and_boundary_lines() {
        let mut symbols = SymbolTable::new();
        let order = sample_order(&mut symbols);
        let mut buf = Vec::new();
        write_order(&order, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "C\nM 320 java/util/HashMap hash ()I\nM 1280 java/util/HashMap resize ()I\nC\nM 48 java/util/HashMap size ()I\nC\n"
        );
    }

    #[test]
    fn test_parse_then_emit_is_idempotent() {
        let mut symbols = SymbolTable::new();
        let order = sample_order(&mut symbols);
        let mut first = Vec::new();
        write_order(&order, &mut first).unwrap();

        let file = write_temp(std::str::from_utf8(&first).unwrap());
        let mut reload_symbols = SymbolTable::new();
        let reloaded = load_order_file(file.path(), &mut reload_symbols).unwrap();

        let mut second = Vec::new();
        write_order(&reloaded, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_counts_and_pads() {
        let file = write_temp("C\nM 320 a b ()V\nM 100 a c ()V\nC\n# note\n");
        let scan = scan_order_file(file.path(), 128).unwrap();
        assert_eq!(scan.method_count, 2);
        // 320 -> 384, 100 -> 128
        assert_eq!(scan.total_code_size, 512);
    }

    #[test]
    fn test_scan_zero_grain_sums_raw_sizes() {
        let file = write_temp("M 320 a b ()V\n");
        let scan = scan_order_file(file.path(), 0).unwrap();
        assert_eq!(scan.total_code_size, 320);
    }

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let file = write_temp("# header\n\nC\nM 64 java/lang/Object toString ()Ljava/lang/String;\nC\n");
        let mut symbols = SymbolTable::new();
        let order = load_order_file(file.path(), &mut symbols).unwrap();
        assert_eq!(order.len(), 3);
        assert!(matches!(order[0], OrderEntry::ClusterBoundary));
        let m = order[1].as_method().unwrap();
        assert_eq!(m.size, 64);
        assert_eq!(m.key.name().as_str(), "toString");
    }

    #[test]
    fn test_load_normalizes_dotted_class_names() {
        let file = write_temp("M 64 java.lang.Object toString ()Ljava.lang.String;\n");
        let mut symbols = SymbolTable::new();
        let order = load_order_file(file.path(), &mut symbols).unwrap();
        let m = order[0].as_method().unwrap();
        assert_eq!(m.key.klass().as_str(), "java/lang/Object");
        assert_eq!(m.key.sig().as_str(), "()Ljava/lang/String;");
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let file = write_temp("C\nX what is this\n");
        let mut symbols = SymbolTable::new();
        let err = load_order_file(file.path(), &mut symbols).unwrap_err();
        assert!(matches!(err, OrderFileError::Malformed { line_no: 2, .. }));
    }

    #[test]
    fn test_malformed_method_line_is_rejected() {
        for bad in ["M", "M 64", "M 64 klass", "M 64 klass name", "M x klass name ()V"] {
            let file = write_temp(&format!("{bad}\n"));
            let mut symbols = SymbolTable::new();
            assert!(
                load_order_file(file.path(), &mut symbols).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let file = write_temp("M 64 a b ()V\nM 80 a b ()V\n");
        let mut symbols = SymbolTable::new();
        let err = load_order_file(file.path(), &mut symbols).unwrap_err();
        assert!(matches!(err, OrderFileError::DuplicateMethod(_)));
    }

    #[test]
    fn test_overlong_line_is_rejected() {
        let long = format!("# {}\n", "x".repeat(MAX_LINE_LEN + 10));
        let file = write_temp(&long);
        let mut symbols = SymbolTable::new();
        let err = load_order_file(file.path(), &mut symbols).unwrap_err();
        assert!(matches!(err, OrderFileError::LineTooLong { .. }));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let mut symbols = SymbolTable::new();
        let err = load_order_file(Path::new("/nonexistent/order.txt"), &mut symbols).unwrap_err();
        assert!(matches!(err, OrderFileError::Missing(_)));
    }
}
