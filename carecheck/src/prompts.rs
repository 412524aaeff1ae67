// carecheck/src/prompts.rs
//
// Prompt text for the analysis, summarization and chat requests. Everything
// here is a pure function of its inputs.

use crate::report::{Grade, ReportData};
use crate::UploadedFile;

const ANALYSIS_PREAMBLE: &str = "\
당신은 장기요양기관 평가 전문가입니다.
아래에 제공되는 [평가 지침] 문서와 [평가 대상 자료] 문서만을 근거로 평가 대상 자료를 분석하세요.
규칙:
- 제공된 문서에 있는 내용만 사용하고, 문서에 없는 사실을 추측하거나 지어내지 마세요.
- 평가 지침의 각 지표에 대해 등급을 매기고, 판단 이유와 근거가 된 원문 내용을 함께 제시하세요.
- 근거 자료가 없으면 등급을 \"자료 누락\"으로, 해당 수급자에게 적용되지 않는 지표는 \"해당없음\"으로 표시하세요.
- 서로 다른 문서 간에 기록이 일치하는지 교차 점검하세요.";

const OUTPUT_DESCRIPTION: &str = "\
응답은 다음 구조의 JSON 객체 하나로만 작성하세요.
- basicInfo: 수급자 기본 정보
  - name: 수급자 이름
  - dob: 생년월일
  - gender: 성별
  - admissionDate: 입소일
  - dischargeDate: 퇴소일 (퇴소하지 않았거나 기록이 없으면 null)
  - evaluationPeriod: 평가 대상 기간
  - facilityName: 기관명
- evaluationItems: 평가 지표별 결과 배열. 각 항목은
  - metric: 평가 지표 이름
  - grade: {grades} 중 하나
  - reason: 등급 판단 이유
  - evidence: 판단 근거가 된 원문 내용 (문서 이름 포함)
- crossCheckResults: 문서 간 교차 점검 결과 배열. 각 항목은
  - item: 점검 항목
  - status: 점검 결과 (예: 일치, 불일치, 확인 불가)
  - recommendation: 개선 권고 사항
- aiSummary: 전체 평가 요약. 강조할 부분은 **굵게** 표시할 수 있습니다.";

const CHAT_INSTRUCTION: &str = "\
당신은 장기요양기관 평가 보고서에 대한 질문에 답하는 도우미입니다.
아래 JSON 보고서의 내용만을 근거로 답하세요.
보고서에 없는 정보를 묻는 경우 추측하지 말고 \"보고서에서 해당 정보를 찾을 수 없습니다\"라고 답하세요.
답변은 한국어로 간결하게 작성하세요.";

fn grade_list() -> String {
    Grade::ALL
        .iter()
        .map(|grade| format!("\"{}\"", grade.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_documents(prompt: &mut String, heading: &str, files: &[UploadedFile]) {
    prompt.push_str(&format!("\n\n## {} ({}개 문서)\n", heading, files.len()));
    if files.is_empty() {
        prompt.push_str("(제공된 문서 없음)\n");
    }
    for file in files {
        prompt.push_str(&format!(
            "\n<document name=\"{}\">\n{}\n</document>\n",
            file.name, file.content
        ));
    }
}

/// The main analysis prompt: preamble, every guideline document, every
/// evaluation document, then the output description. Nothing is truncated.
pub fn build_analysis_prompt(guidelines: &[UploadedFile], evaluations: &[UploadedFile]) -> String {
    let mut prompt = String::from(ANALYSIS_PREAMBLE);
    push_documents(&mut prompt, "평가 지침", guidelines);
    push_documents(&mut prompt, "평가 대상 자료", evaluations);
    prompt.push_str("\n\n## 출력 형식\n");
    prompt.push_str(&OUTPUT_DESCRIPTION.replace("{grades}", &grade_list()));
    prompt
}

/// Prompt for condensing one chunk of an evaluation document.
pub fn build_summary_prompt(
    instruction: &str,
    guidelines: &[UploadedFile],
    file_name: &str,
    chunk_index: usize,
    chunk_count: usize,
    chunk: &str,
) -> String {
    let mut prompt = String::from(instruction.trim());
    push_documents(&mut prompt, "평가 지침", guidelines);
    prompt.push_str(&format!(
        "\n\n## 요약할 자료: {} ({}/{})\n{}\n",
        file_name,
        chunk_index + 1,
        chunk_count,
        chunk
    ));
    prompt
}

/// System instruction for a chat session about `report`.
pub fn build_chat_instruction(report: &ReportData) -> Result<String, serde_json::Error> {
    let report_json = serde_json::to_string_pretty(report)?;
    Ok(format!("{}\n\n[보고서]\n{}", CHAT_INSTRUCTION, report_json))
}
