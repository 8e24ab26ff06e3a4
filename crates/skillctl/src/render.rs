//! Plain-text output for skillctl.

use skill_core::{
    CatalogItem, CatalogResponse, CatalogSource, ErrorBody, ErrorKind, InstallResponse,
    LocalSkill, ScanResponse,
};

pub fn print_scan(response: &ScanResponse) {
    let Some(result) = &response.result else {
        if let Some(error) = &response.error {
            print_error(error);
        }
        return;
    };

    match &result.effective_subpath {
        Some(subpath) => println!("{} ({})", result.normalized_repo, subpath),
        None => println!("{}", result.normalized_repo),
    }
    println!();
    print_items(&result.items, false);
}

fn print_items(items: &[CatalogItem], with_badge: bool) {
    if items.is_empty() {
        println!("No skills found.");
        return;
    }

    println!("{:<28} {:<40} {:<10} DESCRIPTION", "NAME", "DIRECTORY", "STATUS");
    println!("{}", "-".repeat(100));
    for item in items {
        let status = if !item.installable {
            "invalid".to_string()
        } else if with_badge {
            match item.installed.as_ref().and_then(|b| b.scope) {
                Some(scope) => format!("installed:{scope}"),
                None => "available".to_string(),
            }
        } else {
            "ok".to_string()
        };
        println!(
            "{:<28} {:<40} {:<10} {}",
            truncate(&item.skill_name, 28),
            truncate(&item.skill_dir, 40),
            status,
            item.description.as_deref().map(|d| truncate(d, 60)).unwrap_or_default()
        );
        for warning in &item.warnings {
            println!("    warning: {warning}");
        }
    }
    println!();
    println!("{} skill(s)", items.len());
}

pub fn print_install(response: &InstallResponse) {
    if let Some(error) = &response.error {
        print_error(error);
        return;
    }
    let Some(outcome) = &response.outcome else {
        return;
    };

    for skill in &outcome.installed {
        println!("installed  {} ({})", skill.skill_name, skill.scope);
    }
    for skill in &outcome.skipped {
        println!("skipped    {}: {}", skill.skill_name, skill.reason);
    }
    println!();
    println!(
        "{} installed, {} skipped",
        outcome.installed.len(),
        outcome.skipped.len()
    );
}

pub fn print_catalog(catalog: &CatalogResponse) {
    for source in &catalog.sources {
        println!("== {} [{}]", source.label, source.id);
        if let Some(description) = &source.description {
            println!("   {description}");
        }
        println!();
        let items = catalog
            .items_by_source
            .get(&source.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        print_items(items, true);
        println!();
    }
}

pub fn print_sources(sources: &[CatalogSource]) {
    if sources.is_empty() {
        println!("No sources configured.");
        return;
    }

    println!("{:<20} {:<32} {:<16} LABEL", "ID", "SOURCE", "SUBPATH");
    println!("{}", "-".repeat(90));
    for source in sources {
        println!(
            "{:<20} {:<32} {:<16} {}",
            truncate(&source.id, 20),
            truncate(&source.source, 32),
            source.default_subpath.as_deref().unwrap_or("-"),
            source.label
        );
    }
}

pub fn print_installed(skills: &[LocalSkill]) {
    if skills.is_empty() {
        println!("No skills installed.");
        return;
    }

    println!("{:<28} {:<8} PATH", "NAME", "SCOPE");
    println!("{}", "-".repeat(80));
    for skill in skills {
        println!(
            "{:<28} {:<8} {}",
            truncate(&skill.name, 28),
            skill.scope,
            skill.path.display()
        );
    }
}

pub fn print_error(error: &ErrorBody) {
    eprintln!("error: {}", error.message);

    match error.kind {
        ErrorKind::Conflicts => {
            if let Some(conflicts) = &error.conflicts {
                eprintln!();
                eprintln!("Already installed:");
                for conflict in conflicts {
                    eprintln!("  {} ({})", conflict.skill_name, conflict.scope);
                }
            }
            eprintln!();
            eprintln!("Re-run with --skip-all, --overwrite-all, or --decide <name>=skip|overwrite.");
        }
        ErrorKind::AuthRequired => {
            if error.ssh_only == Some(true) {
                eprintln!("This repository requires SSH authentication.");
            }
            match error.identities.as_deref() {
                Some(identities) if !identities.is_empty() => {
                    eprintln!("Known identities (use --identity <id>):");
                    for identity in identities {
                        eprintln!("  {:<16} {}", identity.id, identity.name);
                    }
                }
                _ => eprintln!("Pass --ssh-key <path> to authenticate."),
            }
        }
        _ => {}
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
