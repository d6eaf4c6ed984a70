/// Print a `Table` as aligned columns or as csv, with or without a header.
use rustutils::Table;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub csv: bool,
    pub header: bool,
}

pub fn format_table(output: &mut dyn io::Write, table: &Table, opts: &FormatOptions) {
    if opts.csv {
        format_csv(output, table, opts);
    } else {
        format_fixed_width(output, table, opts);
    }
}

fn format_fixed_width(output: &mut dyn io::Write, table: &Table, opts: &FormatOptions) {
    // The column width is the max across all the entries in the column, including the header if
    // there is one.
    let mut widths = vec![0; table.columns().len()];
    if opts.header {
        for (i, name) in table.columns().iter().enumerate() {
            widths[i] = usize::max(widths[i], name.len());
        }
    }
    for row in table.rows() {
        for (i, val) in row.iter().enumerate() {
            widths[i] = usize::max(widths[i], val.len());
        }
    }

    if opts.header {
        write_line(output, &widths, table.columns());
    }
    for row in table.rows() {
        write_line(output, &widths, row);
    }
}

fn write_line(output: &mut dyn io::Write, widths: &[usize], fields: &[String]) {
    let mut s = "".to_string();
    for (w, val) in widths.iter().zip(fields) {
        let w = *w;
        s += format!("{:w$}  ", val).as_str();
    }
    // Ignore errors here, they are common for broken pipelines.
    let _ = output.write(s.trim_end().as_bytes());
    let _ = output.write(b"\n");
}

fn format_csv(output: &mut dyn io::Write, table: &Table, opts: &FormatOptions) {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);
    if opts.header {
        let _ = writer.write_record(table.columns());
    }
    for row in table.rows() {
        let _ = writer.write_record(row);
    }
    let _ = writer.flush();
}

#[cfg(test)]
fn sample_table() -> Table {
    let mut t = Table::new(vec!["sampleTime".to_string(), "PEND".to_string()]);
    t.push_row(vec!["20240101_000000".to_string(), "4".to_string()]);
    t.push_row(vec!["20240101_000500".to_string(), "12,5".to_string()]);
    t
}

#[test]
fn test_format_fixed_width() {
    let mut out = Vec::new();
    let opts = FormatOptions {
        csv: false,
        header: true,
    };
    format_table(&mut out, &sample_table(), &opts);
    assert!(
        String::from_utf8(out).unwrap()
            == "sampleTime       PEND
20240101_000000  4
20240101_000500  12,5
"
    );

    let mut out = Vec::new();
    let opts = FormatOptions {
        csv: false,
        header: false,
    };
    format_table(&mut out, &Table::new(vec!["x".to_string()]), &opts);
    assert!(out.is_empty());
}

#[test]
fn test_format_csv() {
    let mut out = Vec::new();
    let opts = FormatOptions {
        csv: true,
        header: true,
    };
    format_table(&mut out, &sample_table(), &opts);
    assert!(
        String::from_utf8(out).unwrap()
            == "sampleTime,PEND
20240101_000000,4
20240101_000500,\"12,5\"
"
    );
}
