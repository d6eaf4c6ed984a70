/// Parser for the single-block "header + columns" reports: bqueues, bhosts, lsload, busers.
///
///   QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP  RSV PJOBS
///   normal           30  Open:Active       -    -    -    -     2     0     2     0    0     0
///
/// Values are aligned to the header by position in the whitespace-split token list, not by
/// character column.  A short line is not an error: it is reported and padded with empty strings.
/// Tokens beyond the header width are dropped.
use log::warn;
use rustutils::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    None,

    /// lsload marks overloaded indices with a trailing `*`, eg `ut 98%*`; blank those out.
    StripOverloadMarks,
}

pub fn parse_tabular(text: &str, preprocess: Preprocess) -> Table {
    let mut table: Option<Table> = None;
    for line in text.lines() {
        let line = match preprocess {
            Preprocess::None => line.trim().to_string(),
            Preprocess::StripOverloadMarks => line.replace('*', " ").trim().to_string(),
        };
        if line.is_empty() {
            continue;
        }
        let fields = line
            .split_whitespace()
            .map(|x| x.to_string())
            .collect::<Vec<String>>();
        match table {
            None => {
                table = Some(Table::new(fields));
            }
            Some(ref mut t) => {
                // Unavailable hosts legitimately print only a few columns.
                if fields.len() < t.columns().len() && !fields.iter().any(|f| f == "unavail") {
                    warn!(
                        "Incomplete report line ({} of {} fields): {line}",
                        fields.len(),
                        t.columns().len()
                    );
                }
                t.push_row(fields);
            }
        }
    }
    table.unwrap_or_default()
}

#[test]
fn test_parse_bqueues() {
    let text = "
QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP  RSV PJOBS
normal           30  Open:Active       -    -    -    -     2     0     2     0    0     0

short            40  Open:Active       -    -    -    -    10     4     6     0    0     4
";
    let t = parse_tabular(text, Preprocess::None);
    assert!(t.columns().len() == 13);
    assert!(t.len() == 2);
    assert!(t.column("QUEUE_NAME") == Some(vec!["normal", "short"]));
    assert!(t.column("PEND") == Some(vec!["0", "4"]));
    assert!(t.get(1, "PJOBS") == Some("4"));
}

#[test]
fn test_short_lines_are_padded() {
    // Whatever the header width, a short line yields exactly that many values, the missing
    // trailing ones being empty.
    for width in 1..8 {
        let header = (0..width)
            .map(|i| format!("C{i}"))
            .collect::<Vec<String>>()
            .join(" ");
        for have in 0..width {
            let values = (0..have)
                .map(|i| format!("v{i}"))
                .collect::<Vec<String>>()
                .join(" ");
            let text = format!("{header}\nx{values}\n");
            let t = parse_tabular(&text, Preprocess::None);
            assert!(t.columns().len() == width);
            assert!(t.len() == 1);
            assert!(t.rows()[0].len() == width);
            let got = if have == 0 { 1 } else { have };
            for i in got..width {
                assert!(t.rows()[0][i] == "");
            }
        }
    }
}

#[test]
fn test_parse_lsload() {
    let text = "
HOST_NAME               status  r15s   r1m  r15m   ut    pg    ls    it   tmp    swp   mem
cmp01                   ok      0.7    0.3  0.2    5%    0.0   1     0    7391M  1.9G  931M
cmp02                   busy    9.7*   9.3  8.2    98%*  0.0   1     0    7391M  1.9G  2G
cmp03                   unavail
";
    let t = parse_tabular(text, Preprocess::StripOverloadMarks);
    assert!(t.len() == 3);
    assert!(t.column("ut") == Some(vec!["5%", "98%", ""]));
    assert!(t.get(1, "r15s") == Some("9.7"));
    assert!(t.get(2, "status") == Some("unavail"));
    assert!(t.get(2, "mem") == Some(""));
}

#[test]
fn test_parse_empty() {
    let t = parse_tabular("\n\n", Preprocess::None);
    assert!(t.columns().is_empty());
    assert!(t.is_empty());
}
