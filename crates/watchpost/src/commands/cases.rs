use super::Context;
use watchpost_cases::CaseStore;

fn store() -> anyhow::Result<CaseStore> {
    let ctx = Context::load()?;
    Ok(CaseStore::new(&ctx.paths)?)
}

pub fn run_list(limit: Option<usize>) -> anyhow::Result<()> {
    for case in store()?.list_cases(limit)? {
        let line = serde_json::json!({
            "case_id": case.case_id,
            "created_at": case.created_at,
            "alarm_level": case.result.decision.alarm_level,
            "alarm_reason": case.result.decision.reason,
            "reviewed": case.reviewed,
        });
        println!("{line}");
    }
    Ok(())
}

pub fn run_show(case_id: &str) -> anyhow::Result<()> {
    let Some(case) = store()?.get_case(case_id)? else {
        anyhow::bail!("case {case_id} not found");
    };
    println!("{}", serde_json::to_string_pretty(&case)?);
    Ok(())
}

pub fn run_review(case_id: &str, result: &str) -> anyhow::Result<()> {
    let case = store()?.review_case(case_id, result)?;
    println!(
        "✓ Case {} marked reviewed: {}",
        case.case_id,
        case.review_result.as_deref().unwrap_or_default()
    );
    Ok(())
}
