use carecheck::report::SavedReport;
use carecheck::{Grade, ReportData};
use colored::{ColoredString, Colorize};

fn heading(title: &str) {
    println!("\n{}", format!("■ {title}").bold().underline());
}

fn grade_label(grade: Grade) -> ColoredString {
    let label = format!("[{}]", grade.label());
    match grade {
        Grade::Excellent => label.green().bold(),
        Grade::Good => label.yellow().bold(),
        Grade::Poor => label.red().bold(),
        Grade::NotApplicable | Grade::MissingData => label.dimmed(),
    }
}

pub fn print_saved_report(saved: &SavedReport) {
    println!(
        "{}",
        format!(
            "생성: {}  모델: {}",
            saved.generated_at.format("%Y-%m-%d %H:%M UTC"),
            saved.model
        )
        .dimmed()
    );
    println!("{}", format!("지침: {}", list_or_none(&saved.guideline_files)).dimmed());
    println!("{}", format!("평가 자료: {}", list_or_none(&saved.evaluation_files)).dimmed());
    print_report(&saved.report);
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(없음)".to_string()
    } else {
        names.join(", ")
    }
}

pub fn print_report(report: &ReportData) {
    let info = &report.basic_info;
    heading("기본 정보");
    for (label, value) in [
        ("이름", info.name.as_str()),
        ("생년월일", info.dob.as_str()),
        ("성별", info.gender.as_str()),
        ("입소일", info.admission_date.as_str()),
        ("퇴소일", info.discharge_date.as_deref().unwrap_or("-")),
        ("평가 기간", info.evaluation_period.as_str()),
        ("기관명", info.facility_name.as_str()),
    ] {
        println!("  {:<8} {}", label, value);
    }

    heading(&format!("평가 결과 ({}개 지표)", report.evaluation_items.len()));
    let counts: Vec<String> = report
        .grade_counts()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(grade, count)| format!("{} {}", grade_label(grade), count))
        .collect();
    if !counts.is_empty() {
        println!("  {}", counts.join("  "));
    }
    for item in report.items_by_severity() {
        println!("\n  {} {}", grade_label(item.grade), item.metric.bold());
        println!("      {} {}", "이유:".dimmed(), item.reason);
        println!("      {} {}", "근거:".dimmed(), item.evidence);
    }

    heading("교차 점검");
    if report.cross_check_results.is_empty() {
        println!("  {}", "(결과 없음)".dimmed());
    }
    for check in &report.cross_check_results {
        println!("  {} : {}", check.item.bold(), check.status);
        println!("      {} {}", "권고:".dimmed(), check.recommendation);
    }

    heading("AI 종합 의견");
    let summary: String = report
        .summary_segments()
        .into_iter()
        .map(|(text, bold)| if bold { text.bold().to_string() } else { text.to_string() })
        .collect();
    println!("{summary}");
}
