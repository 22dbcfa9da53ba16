use anyhow::Result;
use keylight::config::Config;
use keylight::effect;

/// List all effects.
pub fn list(config: &Config) -> Result<()> {
    let lib = config.load_effects()?;
    let source = config
        .effects
        .clone()
        .unwrap_or_else(effect::default_effects_path);

    println!("Effects (from {}):", source.display());
    println!();
    println!("{:<16} {:<6} {:<10} Description", "Name", "KFs", "Period");
    println!("{}", "-".repeat(60));

    for (name, def) in &lib.effects {
        let period = match def.keyframes.last() {
            Some(kf) if kf.t > 0.0 => format!("{:.0}ms", kf.t),
            _ => "-".to_string(),
        };
        let desc = def.description.as_deref().unwrap_or("");
        let vars = effect::required_variables(def);
        let var_str = if vars.is_empty() {
            String::new()
        } else {
            format!(" [vars: {}]", vars.join(", "))
        };
        println!(
            "{:<16} {:<6} {:<10} {}{}",
            name,
            def.keyframes.len(),
            period,
            desc,
            var_str
        );
    }

    Ok(())
}
