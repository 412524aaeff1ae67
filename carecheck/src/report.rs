// In carecheck/src/report.rs
//!
//! Report data model and the validation boundary for model output.
//!
//! The model is asked to answer in the shape described by
//! [`response_schema`], but nothing guarantees it does. [`parse_report`]
//! checks every field and reports the first problem with its JSON path.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Grade assigned to one evaluation metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "우수")]
    Excellent,
    #[serde(rename = "양호")]
    Good,
    #[serde(rename = "불량")]
    Poor,
    #[serde(rename = "해당없음")]
    NotApplicable,
    #[serde(rename = "자료 누락")]
    MissingData,
}

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::Excellent,
        Grade::Good,
        Grade::Poor,
        Grade::NotApplicable,
        Grade::MissingData,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Grade::Excellent => "우수",
            Grade::Good => "양호",
            Grade::Poor => "불량",
            Grade::NotApplicable => "해당없음",
            Grade::MissingData => "자료 누락",
        }
    }

    pub fn from_label(label: &str) -> Option<Grade> {
        Grade::ALL.into_iter().find(|grade| grade.label() == label.trim())
    }

    /// 우수 > 양호 > 불량. 해당없음 and 자료 누락 are not ranked.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Grade::Excellent => Some(3),
            Grade::Good => Some(2),
            Grade::Poor => Some(1),
            Grade::NotApplicable | Grade::MissingData => None,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub name: String,
    pub dob: String,
    pub gender: String,
    pub admission_date: String,
    pub discharge_date: Option<String>,
    pub evaluation_period: String,
    pub facility_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationItem {
    pub metric: String,
    pub grade: Grade,
    pub reason: String,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckResult {
    pub item: String,
    pub status: String,
    pub recommendation: String,
}

/// The structured result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub basic_info: BasicInfo,
    pub evaluation_items: Vec<EvaluationItem>,
    pub cross_check_results: Vec<CrossCheckResult>,
    /// May contain `**bold**` markers.
    pub ai_summary: String,
}

impl ReportData {
    /// Items ordered best grade first; unranked grades keep their relative
    /// order at the end.
    pub fn items_by_severity(&self) -> Vec<&EvaluationItem> {
        let mut items: Vec<&EvaluationItem> = self.evaluation_items.iter().collect();
        items.sort_by_key(|item| std::cmp::Reverse(item.grade.rank().map(|r| r + 1).unwrap_or(0)));
        items
    }

    pub fn grade_counts(&self) -> Vec<(Grade, usize)> {
        Grade::ALL
            .into_iter()
            .map(|grade| {
                let count = self
                    .evaluation_items
                    .iter()
                    .filter(|item| item.grade == grade)
                    .count();
                (grade, count)
            })
            .collect()
    }

    /// Splits `aiSummary` into `(text, bold)` runs at `**...**` markers.
    pub fn summary_segments(&self) -> Vec<(&str, bool)> {
        emphasis_segments(&self.ai_summary)
    }
}

static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid emphasis regex"));

fn emphasis_segments(text: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for caps in EMPHASIS.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push((&text[cursor..whole.start()], false));
        }
        segments.push((inner.as_str(), true));
        cursor = whole.end();
    }
    if cursor < text.len() {
        segments.push((&text[cursor..], false));
    }
    segments
}

/// What `analyze --out` writes: the report plus enough context to know
/// where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReport {
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub guideline_files: Vec<String>,
    pub evaluation_files: Vec<String>,
    pub report: ReportData,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReportParseError {
    #[error("the model returned an empty response")]
    Empty,
    #[error("the response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("the response is not a JSON object")]
    NotAnObject,
    #[error("required field `{0}` is missing")]
    MissingField(String),
    #[error("field `{path}` should be {expected}")]
    WrongType { path: String, expected: &'static str },
    #[error("field `{path}` has unknown grade `{value}`")]
    InvalidGrade { path: String, value: String },
}

const TOP_LEVEL_FIELDS: [&str; 4] = [
    "basicInfo",
    "evaluationItems",
    "crossCheckResults",
    "aiSummary",
];

/// Parses and validates raw model output into a [`ReportData`].
pub fn parse_report(raw: &str) -> Result<ReportData, ReportParseError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ReportParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ReportParseError::InvalidJson(e.to_string()))?;
    let root = value.as_object().ok_or(ReportParseError::NotAnObject)?;

    for field in TOP_LEVEL_FIELDS {
        if !root.contains_key(field) {
            return Err(ReportParseError::MissingField(field.to_string()));
        }
    }

    let info = object_field(root, "basicInfo", "basicInfo")?;
    let basic_info = BasicInfo {
        name: string_field(info, "name", "basicInfo")?,
        dob: string_field(info, "dob", "basicInfo")?,
        gender: string_field(info, "gender", "basicInfo")?,
        admission_date: string_field(info, "admissionDate", "basicInfo")?,
        discharge_date: nullable_string_field(info, "dischargeDate", "basicInfo")?,
        evaluation_period: string_field(info, "evaluationPeriod", "basicInfo")?,
        facility_name: string_field(info, "facilityName", "basicInfo")?,
    };

    let evaluation_items = array_field(root, "evaluationItems")?
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = format!("evaluationItems[{i}]");
            let item = entry.as_object().ok_or_else(|| ReportParseError::WrongType {
                path: path.clone(),
                expected: "an object",
            })?;
            let grade_label = string_field(item, "grade", &path)?;
            let grade =
                Grade::from_label(&grade_label).ok_or_else(|| ReportParseError::InvalidGrade {
                    path: format!("{path}.grade"),
                    value: grade_label.clone(),
                })?;
            Ok(EvaluationItem {
                metric: string_field(item, "metric", &path)?,
                grade,
                reason: string_field(item, "reason", &path)?,
                evidence: string_field(item, "evidence", &path)?,
            })
        })
        .collect::<Result<Vec<_>, ReportParseError>>()?;

    let cross_check_results = array_field(root, "crossCheckResults")?
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = format!("crossCheckResults[{i}]");
            let result = entry.as_object().ok_or_else(|| ReportParseError::WrongType {
                path: path.clone(),
                expected: "an object",
            })?;
            Ok(CrossCheckResult {
                item: string_field(result, "item", &path)?,
                status: string_field(result, "status", &path)?,
                recommendation: string_field(result, "recommendation", &path)?,
            })
        })
        .collect::<Result<Vec<_>, ReportParseError>>()?;

    let ai_summary = string_field(root, "aiSummary", "")?;

    Ok(ReportData {
        basic_info,
        evaluation_items,
        cross_check_results,
        ai_summary,
    })
}

/// Some models wrap JSON in a markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn object_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ReportParseError> {
    obj.get(key)
        .ok_or_else(|| ReportParseError::MissingField(path.to_string()))?
        .as_object()
        .ok_or_else(|| ReportParseError::WrongType {
            path: path.to_string(),
            expected: "an object",
        })
}

fn array_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Vec<Value>, ReportParseError> {
    obj.get(key)
        .ok_or_else(|| ReportParseError::MissingField(key.to_string()))?
        .as_array()
        .ok_or_else(|| ReportParseError::WrongType {
            path: key.to_string(),
            expected: "an array",
        })
}

fn string_field(
    obj: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<String, ReportParseError> {
    let path = join_path(parent, key);
    match obj.get(key) {
        None => Err(ReportParseError::MissingField(path)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ReportParseError::WrongType {
            path,
            expected: "a string",
        }),
    }
}

fn nullable_string_field(
    obj: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<Option<String>, ReportParseError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ReportParseError::WrongType {
            path: join_path(parent, key),
            expected: "a string or null",
        }),
    }
}

/// The report shape in the OpenAPI subset Gemini accepts as
/// `generationConfig.responseSchema`.
pub fn response_schema() -> Value {
    let string = || json!({ "type": "STRING" });
    let grades: Vec<&str> = Grade::ALL.iter().map(Grade::label).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "basicInfo": {
                "type": "OBJECT",
                "properties": {
                    "name": string(),
                    "dob": string(),
                    "gender": string(),
                    "admissionDate": string(),
                    "dischargeDate": { "type": "STRING", "nullable": true },
                    "evaluationPeriod": string(),
                    "facilityName": string()
                },
                "required": [
                    "name", "dob", "gender", "admissionDate",
                    "evaluationPeriod", "facilityName"
                ]
            },
            "evaluationItems": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "metric": string(),
                        "grade": { "type": "STRING", "enum": grades },
                        "reason": string(),
                        "evidence": string()
                    },
                    "required": ["metric", "grade", "reason", "evidence"]
                }
            },
            "crossCheckResults": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "item": string(),
                        "status": string(),
                        "recommendation": string()
                    },
                    "required": ["item", "status", "recommendation"]
                }
            },
            "aiSummary": string()
        },
        "required": TOP_LEVEL_FIELDS
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_report_json(items: usize) -> String {
        let evaluation_items: Vec<Value> = (0..items)
            .map(|i| {
                json!({
                    "metric": format!("지표 {}", i + 1),
                    "grade": Grade::ALL[i % Grade::ALL.len()].label(),
                    "reason": "기록 확인",
                    "evidence": "2024-03-02 욕창 예방 기록"
                })
            })
            .collect();

        json!({
            "basicInfo": {
                "name": "홍길동",
                "dob": "1940-01-01",
                "gender": "남",
                "admissionDate": "2023-05-01",
                "dischargeDate": null,
                "evaluationPeriod": "2024-01-01 ~ 2024-06-30",
                "facilityName": "행복요양원"
            },
            "evaluationItems": evaluation_items,
            "crossCheckResults": [
                { "item": "투약 기록", "status": "일치", "recommendation": "유지" }
            ],
            "aiSummary": "전반적으로 **양호**합니다."
        })
        .to_string()
    }

    #[test]
    fn parses_a_complete_report() -> Result<(), ReportParseError> {
        let report = parse_report(&sample_report_json(3))?;
        assert_eq!(report.basic_info.name, "홍길동");
        assert_eq!(report.basic_info.discharge_date, None);
        assert_eq!(report.evaluation_items.len(), 3);
        assert_eq!(report.evaluation_items[2].grade, Grade::Poor);
        assert_eq!(report.cross_check_results[0].status, "일치");
        Ok(())
    }

    #[test]
    fn accepts_fenced_json() -> Result<(), ReportParseError> {
        let fenced = format!("```json\n{}\n```", sample_report_json(1));
        assert_eq!(parse_report(&fenced)?.evaluation_items.len(), 1);
        Ok(())
    }

    #[test]
    fn serializes_back_to_the_wire_shape() -> Result<(), ReportParseError> {
        let report = parse_report(&sample_report_json(2))?;
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["basicInfo"]["facilityName"], "행복요양원");
        assert_eq!(value["evaluationItems"][1]["grade"], "양호");
        assert!(value["basicInfo"]["dischargeDate"].is_null());
        Ok(())
    }

    #[test]
    fn empty_and_garbage_are_rejected() {
        assert_eq!(parse_report("  \n"), Err(ReportParseError::Empty));
        assert!(matches!(
            parse_report("{not json"),
            Err(ReportParseError::InvalidJson(_))
        ));
        assert_eq!(parse_report("[1, 2]"), Err(ReportParseError::NotAnObject));
    }

    #[test]
    fn missing_top_level_field_is_named() {
        let mut value: Value = serde_json::from_str(&sample_report_json(1)).unwrap();
        value.as_object_mut().unwrap().remove("crossCheckResults");
        assert_eq!(
            parse_report(&value.to_string()),
            Err(ReportParseError::MissingField("crossCheckResults".into()))
        );
    }

    #[test]
    fn nested_problems_carry_their_path() {
        let mut value: Value = serde_json::from_str(&sample_report_json(2)).unwrap();
        value["evaluationItems"][1]["grade"] = json!("보통");
        assert_eq!(
            parse_report(&value.to_string()),
            Err(ReportParseError::InvalidGrade {
                path: "evaluationItems[1].grade".into(),
                value: "보통".into()
            })
        );

        let mut value: Value = serde_json::from_str(&sample_report_json(1)).unwrap();
        value["basicInfo"]["dob"] = json!(19400101);
        assert_eq!(
            parse_report(&value.to_string()),
            Err(ReportParseError::WrongType {
                path: "basicInfo.dob".into(),
                expected: "a string"
            })
        );
    }

    #[test]
    fn grade_ranking_puts_neutral_grades_last() -> Result<(), ReportParseError> {
        let report = parse_report(&sample_report_json(5))?;
        let ordered: Vec<Grade> = report.items_by_severity().iter().map(|i| i.grade).collect();
        assert_eq!(
            ordered,
            vec![
                Grade::Excellent,
                Grade::Good,
                Grade::Poor,
                Grade::NotApplicable,
                Grade::MissingData
            ]
        );
        assert!(report.grade_counts().iter().all(|(_, count)| *count == 1));
        Ok(())
    }

    #[test]
    fn emphasis_markers_split_the_summary() {
        assert_eq!(
            emphasis_segments("전반적으로 **양호**하나 **낙상** 기록 보완 필요"),
            vec![
                ("전반적으로 ", false),
                ("양호", true),
                ("하나 ", false),
                ("낙상", true),
                (" 기록 보완 필요", false)
            ]
        );
        assert_eq!(emphasis_segments("강조 없음"), vec![("강조 없음", false)]);
        assert_eq!(
            emphasis_segments("닫히지 않은 **강조"),
            vec![("닫히지 않은 **강조", false)]
        );
        assert!(emphasis_segments("").is_empty());
    }

    #[test]
    fn schema_lists_every_grade() {
        let schema = response_schema();
        let grades = schema["properties"]["evaluationItems"]["items"]["properties"]["grade"]
            ["enum"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(grades, Grade::ALL.len());
        assert_eq!(schema["required"].as_array().unwrap().len(), 4);
    }
}
