use crate::db::models::{QualityRecord, StageRecord};
use crate::error::{AppError, Result};
use crate::quality;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Accepted timestamp layouts, tried in order after RFC 3339. Naive values
/// are taken as UTC. KPI reports come out of spreadsheets, so the common
/// spreadsheet renderings are all here.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %H:%M",
];

#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    pub total_rows: usize,
    pub parsed: usize,
    pub dropped: usize,
    pub empty_lines: usize,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_rate(&self) -> f64 {
        if self.total_rows > 0 {
            self.dropped as f64 / self.total_rows as f64
        } else {
            0.0
        }
    }
}

/// Column layout of a report, resolved from its header row. Labels are
/// matched after trimming and lowercasing to tolerate upstream formatting
/// noise in uploaded spreadsheets.
struct Header {
    labels: Vec<String>,
}

impl Header {
    fn parse(line: &str) -> Self {
        let labels = line
            .split(',')
            .map(|label| label.trim().to_lowercase())
            .collect();
        Self { labels }
    }

    fn require(&self, label: &str) -> Result<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| AppError::Parse(format!("Missing required column '{}'", label)))
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Split a data row into the same number of fields as the header. Extra
/// commas are folded back into the last column so free-text trailing fields
/// (quality comments) survive.
fn split_row(line: &str, columns: usize) -> Vec<String> {
    let mut fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
    if columns > 0 && fields.len() > columns {
        let tail = fields.split_off(columns - 1).join(", ");
        fields.push(tail);
    }
    fields
}

pub struct Parser;

impl Parser {
    /// Parse a KPI stage report. Rows with a blank or unparsable timestamp,
    /// an end time before the start time, an empty well name, or a
    /// non-positive stage number are dropped and counted - never kept
    /// partially, and never fatal to the report.
    pub fn parse_stage_report(content: &str) -> Result<(Vec<StageRecord>, ParseStats)> {
        let mut stats = ParseStats::new();
        let mut records = Vec::new();

        let mut lines = content.lines();
        let header = match next_header(&mut lines, &mut stats) {
            Some(h) => h,
            None => return Ok((records, stats)),
        };

        let well_col = header.require("well name")?;
        let stage_col = header.require("stage")?;
        let start_col = header.require("start time")?;
        let end_col = header.require("end time")?;

        for (line_num, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                stats.empty_lines += 1;
                continue;
            }
            stats.total_rows += 1;

            let fields = split_row(line, header.len());
            match parse_stage_row(&fields, well_col, stage_col, start_col, end_col) {
                Ok(record) => {
                    records.push(record);
                    stats.parsed += 1;
                }
                Err(reason) => {
                    stats.dropped += 1;
                    warn!("Dropping stage row {}: {} - {}", line_num + 2, reason, line);
                }
            }
        }

        Ok((records, stats))
    }

    /// Parse a quality checklist report. Condition values must belong to
    /// the fixed category sets; rows that do not are dropped like malformed
    /// stage rows.
    pub fn parse_quality_report(content: &str) -> Result<(Vec<QualityRecord>, ParseStats)> {
        let mut stats = ParseStats::new();
        let mut records = Vec::new();

        let mut lines = content.lines();
        let header = match next_header(&mut lines, &mut stats) {
            Some(h) => h,
            None => return Ok((records, stats)),
        };

        let well_col = header.require("well name")?;
        let stage_col = header.require("stage")?;
        let pre_col = header.require("pre sand")?;
        let post_col = header.require("post sand")?;
        let spp_col = header.require("spp")?;
        let comments_col = header.require("comments")?;

        for (line_num, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                stats.empty_lines += 1;
                continue;
            }
            stats.total_rows += 1;

            let fields = split_row(line, header.len());
            match parse_quality_row(
                &fields,
                well_col,
                stage_col,
                pre_col,
                post_col,
                spp_col,
                comments_col,
            ) {
                Ok(record) => {
                    records.push(record);
                    stats.parsed += 1;
                }
                Err(reason) => {
                    stats.dropped += 1;
                    warn!(
                        "Dropping quality row {}: {} - {}",
                        line_num + 2,
                        reason,
                        line
                    );
                }
            }
        }

        Ok((records, stats))
    }
}

fn next_header<'a, I>(lines: &mut I, stats: &mut ParseStats) -> Option<Header>
where
    I: Iterator<Item = &'a str>,
{
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            stats.empty_lines += 1;
            continue;
        }
        return Some(Header::parse(line));
    }
    None
}

fn parse_stage_row(
    fields: &[String],
    well_col: usize,
    stage_col: usize,
    start_col: usize,
    end_col: usize,
) -> std::result::Result<StageRecord, String> {
    let well_name = field(fields, well_col)?;
    if well_name.is_empty() {
        return Err("empty well name".to_string());
    }

    let stage_number = parse_stage_number(&field(fields, stage_col)?)
        .ok_or_else(|| format!("invalid stage number '{}'", fields[stage_col]))?;

    let start_raw = field(fields, start_col)?;
    let start_time = parse_timestamp(&start_raw)
        .ok_or_else(|| format!("unparsable start time '{}'", start_raw))?;

    let end_raw = field(fields, end_col)?;
    let end_time =
        parse_timestamp(&end_raw).ok_or_else(|| format!("unparsable end time '{}'", end_raw))?;

    if end_time < start_time {
        return Err(format!(
            "end time {} before start time {}",
            end_raw, start_raw
        ));
    }

    Ok(StageRecord {
        well_name,
        stage_number,
        start_time,
        end_time,
    })
}

fn parse_quality_row(
    fields: &[String],
    well_col: usize,
    stage_col: usize,
    pre_col: usize,
    post_col: usize,
    spp_col: usize,
    comments_col: usize,
) -> std::result::Result<QualityRecord, String> {
    let well_name = field(fields, well_col)?;
    if well_name.is_empty() {
        return Err("empty well name".to_string());
    }

    let stage_number = parse_stage_number(&field(fields, stage_col)?)
        .ok_or_else(|| format!("invalid stage number '{}'", fields[stage_col]))?;

    let pre_sand = field(fields, pre_col)?;
    if !quality::is_valid_pre_sand(&pre_sand) {
        return Err(format!("unknown pre sand condition '{}'", pre_sand));
    }

    let post_sand = field(fields, post_col)?;
    if !quality::is_valid_post_sand(&post_sand) {
        return Err(format!("unknown post sand condition '{}'", post_sand));
    }

    let spp = field(fields, spp_col)?;
    if !quality::is_valid_spp(&spp) {
        return Err(format!("unknown SPP condition '{}'", spp));
    }

    let comments = fields.get(comments_col).cloned().unwrap_or_default();

    Ok(QualityRecord {
        well_name,
        stage_number,
        pre_sand,
        post_sand,
        spp,
        comments,
    })
}

fn field(fields: &[String], idx: usize) -> std::result::Result<String, String> {
    fields
        .get(idx)
        .cloned()
        .ok_or_else(|| format!("row has fewer than {} fields", idx + 1))
}

/// Stage numbers must be positive integers; spreadsheets sometimes render
/// them as floats ("31.0"), which is tolerated.
fn parse_stage_number(s: &str) -> Option<i32> {
    let value = match s.parse::<i32>() {
        Ok(v) => v,
        Err(_) => {
            let f = s.parse::<f64>().ok()?;
            if f.fract() != 0.0 || f > i32::MAX as f64 || f < i32::MIN as f64 {
                return None;
            }
            f as i32
        }
    };

    if value > 0 {
        Some(value)
    } else {
        None
    }
}

/// Permissive timestamp parsing. Returns None rather than an error: a row
/// whose timestamps cannot be read is excluded, not fatal.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = "2024-01-15 14:30:00";
        for raw in [
            "2024-01-15 14:30:00",
            "2024-01-15T14:30:00",
            "2024-01-15 14:30",
            "2024-01-15T14:30",
            "01/15/2024 14:30",
            "01/15/2024 02:30 PM",
            "2024-01-15T14:30:00Z",
        ] {
            let parsed = parse_timestamp(raw).unwrap_or_else(|| panic!("failed on '{}'", raw));
            assert_eq!(
                parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
                expected,
                "input '{}'",
                raw
            );
        }
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2024-13-40 99:99"), None);
    }

    #[test]
    fn test_parse_stage_number() {
        assert_eq!(parse_stage_number("7"), Some(7));
        assert_eq!(parse_stage_number("31.0"), Some(31));
        assert_eq!(parse_stage_number("0"), None);
        assert_eq!(parse_stage_number("-3"), None);
        assert_eq!(parse_stage_number("7.5"), None);
        assert_eq!(parse_stage_number("abc"), None);
    }

    #[test]
    fn test_parse_stage_report_drops_bad_rows() {
        let content = "\
Well Name , Stage , Start time , End time
A-1H,1,2024-01-01 00:00,2024-01-01 01:00
A-1H,2,not a date,2024-01-01 04:00
A-1H,3,2024-01-01 05:00,
,4,2024-01-01 06:00,2024-01-01 07:00
A-1H,5,2024-01-01 09:00,2024-01-01 08:00
B-2H,1,2024-01-01 02:00,2024-01-01 03:30";

        let (records, stats) = Parser::parse_stage_report(content).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(stats.total_rows, 6);
        assert_eq!(stats.parsed, 2);
        assert_eq!(stats.dropped, 4);

        // Input row order is preserved
        assert_eq!(records[0].well_name, "A-1H");
        assert_eq!(records[0].stage_number, 1);
        assert_eq!(records[1].well_name, "B-2H");
        assert!((records[1].duration_hours() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_stage_report_never_exceeds_input_rows() {
        let content = "Well Name,Stage,Start time,End time\n\
                       A,1,garbage,garbage\n\
                       A,2,2024-01-01 00:00,2024-01-01 01:00";
        let (records, stats) = Parser::parse_stage_report(content).unwrap();
        assert!(records.len() <= stats.total_rows);
    }

    #[test]
    fn test_parse_stage_report_missing_column_is_fatal() {
        let content = "Well Name,Stage,Start time\nA,1,2024-01-01 00:00";
        let result = Parser::parse_stage_report(content);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("end time"));
    }

    #[test]
    fn test_parse_stage_report_empty_content() {
        let (records, stats) = Parser::parse_stage_report("").unwrap();
        assert!(records.is_empty());
        assert_eq!(stats.total_rows, 0);

        let (records, stats) = Parser::parse_stage_report("  \n\n  \n").unwrap();
        assert!(records.is_empty());
        assert_eq!(stats.empty_lines, 3);
    }

    #[test]
    fn test_parse_quality_report() {
        let content = "\
Well Name,Stage,Pre Sand,Post Sand,SPP,Comments
B-2H,1,Good,Good,Good,
B-2H,2,Bad,No post sand,Anomaly,pressure spike, re-checked after swap
B-2H,3,Excellent,Good,Good,made-up condition";

        let (records, stats) = Parser::parse_quality_report(content).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(records[0].comments, "");
        // Comma inside the trailing comment column is folded back
        assert_eq!(records[1].comments, "pressure spike, re-checked after swap");
        assert_eq!(records[1].post_sand, "No post sand");
    }

    #[test]
    fn test_quality_report_drop_rate() {
        let content = "\
Well Name,Stage,Pre Sand,Post Sand,SPP,Comments
B-2H,0,Good,Good,Good,bad stage number
B-2H,2,Good,Good,Good,ok";
        let (_, stats) = Parser::parse_quality_report(content).unwrap();
        assert!((stats.drop_rate() - 0.5).abs() < 1e-9);
    }
}
