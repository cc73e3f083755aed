//! The `examforge init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("examforge.toml").exists() {
        println!("examforge.toml already exists, skipping.");
    } else {
        std::fs::write("examforge.toml", SAMPLE_CONFIG)?;
        println!("Created examforge.toml");
    }

    std::fs::create_dir_all("banks")?;
    let example_path = std::path::Path::new("banks/example.toml");
    if example_path.exists() {
        println!("banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit examforge.toml with your Supabase project and OpenRouter key");
    println!("  2. Run: examforge validate --bank-file banks/example.toml");
    println!("  3. Run: examforge practice --local banks/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

# [supabase]
# url = "https://your-project.supabase.co"
# anon_key = "${SUPABASE_ANON_KEY}"

[explainer]
type = "openrouter"
api_key = "${OPENROUTER_API_KEY}"
model = "@preset/ai-explainer"
use_shared_key = true

[practice]
question_seconds = 30
explain_mode = "concise"

[access]
enforce = false
allowed_emails = []
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Bank"

[[questions]]
id = "heparin-reversal"
stem = "Which drug reverses the anticoagulant effect of heparin?"

[[questions.answers]]
text = "Vitamin K"
explanation = "Vitamin K reverses warfarin, not heparin."

[[questions.answers]]
text = "Protamine sulfate"
correct = true
explanation = "Protamine binds heparin and neutralizes it."

[[questions.answers]]
text = "Idarucizumab"

[[questions]]
id = "angina-first-line"
stem = "Which class is first-line for symptom control in stable angina?"

[[questions.answers]]
text = "Beta blockers"
correct = true

[[questions.answers]]
text = "Digoxin"

[[questions.answers]]
text = "Loop diuretics"
"#;
