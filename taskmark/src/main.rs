use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use taskmark::core::{ParsedNote, TaskId};
use taskmark::edit;
use taskmark::format::render_note;
use taskmark::parser::{lint_note, parse_note, scan_tokens};
use taskmark::projectors::task_list_projector::{self, IdLookup, TaskListView};

#[derive(Debug, Parser)]
#[command(
    name = "taskmark",
    about = "Task-markup tooling for note documents",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse note files and print their tasks and display content.
    Parse(ParseArgs),

    /// Render notes the way a read-only viewer shows them.
    Show(ShowArgs),

    /// Print the grouped task list with a progress summary.
    Tasks(TasksArgs),

    /// Print note content with all task tokens stripped.
    Strip(StripArgs),

    /// Add a new pending task to a note.
    Add(AddArgs),

    /// Toggle a task's completion state.
    Toggle(ToggleArgs),

    /// Rewrite a task's label.
    Edit(EditArgs),

    /// Remove a task from a note.
    Remove(RemoveArgs),

    /// Report malformed task tokens.
    Lint(LintArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Note files or directories containing note files to parse.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Note files or directories containing note files to render.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct TasksArgs {
    /// Note files or directories containing note files to list tasks from.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a human-readable list.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct StripArgs {
    /// Note files or directories to strip.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Overwrite each file with its display content instead of printing.
    /// This removes the task tokens permanently.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Note file to add the task to.
    file: PathBuf,
    /// Label of the new task.
    #[arg(long)]
    text: String,
    /// Insert at this byte offset instead of appending at the end.
    #[arg(long)]
    at: Option<usize>,
    /// Overwrite the file instead of printing the updated document.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct ToggleArgs {
    /// Note file containing the task.
    file: PathBuf,
    /// Task id, or a unique prefix of one.
    id: String,
    /// Overwrite the file instead of printing the updated document.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct EditArgs {
    /// Note file containing the task.
    file: PathBuf,
    /// Task id, or a unique prefix of one.
    id: String,
    /// New label for the task.
    #[arg(long)]
    text: String,
    /// Overwrite the file instead of printing the updated document.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct RemoveArgs {
    /// Note file containing the task.
    file: PathBuf,
    /// Task id, or a unique prefix of one.
    id: String,
    /// Overwrite the file instead of printing the updated document.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct LintArgs {
    /// Note files or directories to check for malformed tokens.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    match cli.command {
        Commands::Parse(args) => handle_parse(args, verbose),
        Commands::Show(args) => handle_show(args, verbose),
        Commands::Tasks(args) => handle_tasks(args, verbose),
        Commands::Strip(args) => handle_strip(args, verbose),
        Commands::Add(args) => handle_add(args, verbose),
        Commands::Toggle(args) => handle_toggle(args, verbose),
        Commands::Edit(args) => handle_edit(args, verbose),
        Commands::Remove(args) => handle_remove(args, verbose),
        Commands::Lint(args) => handle_lint(args, verbose),
    }
}

fn handle_parse(args: ParseArgs, verbose: bool) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no note files found in the provided inputs");
    }

    let mut parsed = Vec::new();
    for path in expanded {
        if verbose {
            eprintln!("Parsing {:?}", path);
        }
        let text = read_note(&path)?;
        parsed.push((path, parse_note(&text)));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            note: &'a ParsedNote,
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, note)| JsonOutput {
                path: path.display().to_string(),
                note,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, note)) in parsed.iter().enumerate() {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", note);
            if parsed.len() > 1 && idx + 1 < parsed.len() {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_show(args: ShowArgs, verbose: bool) -> Result<()> {
    let ShowArgs { inputs } = args;
    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no note files found in the provided inputs");
    }

    for (idx, path) in expanded.iter().enumerate() {
        if verbose {
            eprintln!("Rendering {:?}", path);
        }
        let text = read_note(path)?;
        if expanded.len() > 1 {
            if idx > 0 {
                println!();
            }
            println!("== {} ==", path.display());
        }
        print_document(&render_note(&parse_note(&text)));
    }
    Ok(())
}

fn handle_tasks(args: TasksArgs, verbose: bool) -> Result<()> {
    let TasksArgs { inputs, json } = args;
    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no note files found in the provided inputs");
    }

    let mut views: Vec<(PathBuf, TaskListView)> = Vec::new();
    for path in expanded {
        if verbose {
            eprintln!("Listing tasks in {:?}", path);
        }
        let text = read_note(&path)?;
        let note = parse_note(&text);
        views.push((path, task_list_projector::project(&note.tasks)));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            tasks: &'a TaskListView,
        }

        let payload: Vec<JsonOutput<'_>> = views
            .iter()
            .map(|(path, view)| JsonOutput {
                path: path.display().to_string(),
                tasks: view,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for (idx, (path, view)) in views.iter().enumerate() {
        if views.len() > 1 {
            if idx > 0 {
                println!();
            }
            println!("== {} ==", path.display());
        }
        if view.progress.total == 0 {
            println!("No tasks.");
            continue;
        }
        println!(
            "Tasks: {} pending, {} completed ({}% complete)",
            view.progress.pending, view.progress.completed, view.progress.percent_complete
        );
        for task in view.pending.iter().chain(view.completed.iter()) {
            println!(
                "  [{}] {}  ({})",
                if task.completed { 'x' } else { ' ' },
                task.text,
                task.id
            );
        }
    }
    Ok(())
}

fn handle_strip(args: StripArgs, verbose: bool) -> Result<()> {
    let StripArgs { inputs, in_place } = args;
    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no note files found in the provided inputs");
    }

    let multiple = expanded.len() > 1;
    for (idx, path) in expanded.iter().enumerate() {
        if verbose {
            eprintln!("Stripping {:?}", path);
        }
        let text = read_note(path)?;
        let stripped = parse_note(&text).display_content;

        if in_place {
            fs::write(path, stripped.as_bytes())
                .with_context(|| format!("writing {:?}", path))?;
            println!("Stripped task tokens from {:?}", path);
        } else {
            if multiple {
                if idx > 0 {
                    println!();
                }
                println!("== {} ==", path.display());
            }
            print_document(&stripped);
        }
    }
    Ok(())
}

fn handle_add(args: AddArgs, verbose: bool) -> Result<()> {
    let AddArgs {
        file,
        text,
        at,
        in_place,
    } = args;
    let content = read_note(&file)?;
    let existing = parse_note(&content).tasks.len() as u32;

    let (updated, task) = match at {
        Some(offset) => edit::insert_task_at(&content, offset, existing, &text),
        None => edit::append_task(&content, existing, &text),
    };
    if verbose {
        eprintln!("Generated task id {}", task.id);
    }

    if in_place {
        fs::write(&file, updated.as_bytes()).with_context(|| format!("writing {:?}", file))?;
        println!("Added task {} to {:?}", task.id, file);
    } else {
        print_document(&updated);
    }
    Ok(())
}

fn handle_toggle(args: ToggleArgs, verbose: bool) -> Result<()> {
    let ToggleArgs { file, id, in_place } = args;
    let content = read_note(&file)?;
    let task_id = resolve_task_id(&content, &id, &file)?;
    if verbose {
        eprintln!("Toggling task {} in {:?}", task_id, file);
    }
    write_updated(&file, edit::toggle_task(&content, &task_id), in_place, || {
        format!("Toggled task {} in {:?}", task_id, file)
    })
}

fn handle_edit(args: EditArgs, verbose: bool) -> Result<()> {
    let EditArgs {
        file,
        id,
        text,
        in_place,
    } = args;
    let content = read_note(&file)?;
    let task_id = resolve_task_id(&content, &id, &file)?;
    if verbose {
        eprintln!("Rewriting task {} in {:?}", task_id, file);
    }
    write_updated(
        &file,
        edit::set_text(&content, &task_id, &text),
        in_place,
        || format!("Updated task {} in {:?}", task_id, file),
    )
}

fn handle_remove(args: RemoveArgs, verbose: bool) -> Result<()> {
    let RemoveArgs { file, id, in_place } = args;
    let content = read_note(&file)?;
    let task_id = resolve_task_id(&content, &id, &file)?;
    if verbose {
        eprintln!("Removing task {} from {:?}", task_id, file);
    }
    write_updated(&file, edit::remove_task(&content, &task_id), in_place, || {
        format!("Removed task {} from {:?}", task_id, file)
    })
}

fn handle_lint(args: LintArgs, verbose: bool) -> Result<()> {
    let LintArgs { inputs } = args;
    let expanded = expand_inputs(&inputs, verbose)?;
    if expanded.is_empty() {
        anyhow::bail!("no note files found in the provided inputs");
    }

    let mut total = 0usize;
    for path in expanded {
        if verbose {
            eprintln!("Linting {:?}", path);
        }
        let text = read_note(&path)?;
        for issue in lint_note(&text) {
            total += 1;
            println!(
                "{}:{}: {} ({})",
                path.display(),
                line_of(&text, issue.span.start),
                issue.error,
                issue.span.slice(&text)
            );
        }
    }
    if total > 0 {
        anyhow::bail!(
            "{} malformed task token{} found",
            total,
            if total == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

/* ------------------------------- Helpers ------------------------------- */

fn read_note(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {:?}", path))
}

fn print_document(content: &str) {
    print!("{content}");
    if !content.is_empty() && !content.ends_with('\n') {
        println!();
    }
}

fn write_updated<F>(path: &Path, updated: String, in_place: bool, status: F) -> Result<()>
where
    F: FnOnce() -> String,
{
    if in_place {
        fs::write(path, updated.as_bytes()).with_context(|| format!("writing {:?}", path))?;
        println!("{}", status());
    } else {
        print_document(&updated);
    }
    Ok(())
}

fn resolve_task_id(content: &str, needle: &str, path: &Path) -> Result<TaskId> {
    let index = task_list_projector::task_index(scan_tokens(content));
    match task_list_projector::resolve_id(&index, needle) {
        IdLookup::Found(task) => Ok(task.id.clone()),
        IdLookup::Ambiguous(hits) => anyhow::bail!(
            "task id `{}` is ambiguous in {:?}: {}",
            needle,
            path,
            hits.join(", ")
        ),
        IdLookup::Missing => anyhow::bail!("no task with id `{}` in {:?}", needle, path),
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

fn is_note_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("txt") | Some("md")
    )
}

/// Expand CLI inputs: explicit files are taken as given; directories are
/// scanned recursively for note files, skipping symlinks, deduplicated.
fn expand_inputs(paths: &[PathBuf], verbose: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            if verbose {
                eprintln!("Scanning directory {:?}", canonical);
            }
            for file in collect_note_files(&canonical, verbose)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if visited.insert(canonical.clone()) {
            out.push(canonical);
        }
    }
    Ok(out)
}

fn collect_note_files(dir: &Path, verbose: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited, verbose)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn visit_dir(
    path: &Path,
    out: &mut Vec<PathBuf>,
    visited: &mut HashSet<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        if verbose {
            eprintln!("Visiting directory {:?}", canonical);
        }
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited, verbose)?;
        }
    } else if metadata.is_file() && is_note_file(&canonical) {
        if verbose {
            eprintln!("Found note file {:?}", canonical);
        }
        out.push(canonical);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expand_inputs_scans_note_files_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.txt"), "one").expect("write a");
        fs::write(tmp.path().join("b.md"), "two").expect("write b");
        fs::write(tmp.path().join("c.org"), "three").expect("write c");

        let expanded = expand_inputs(&[tmp.path().to_path_buf()], false).expect("expand");
        let names: Vec<String> = expanded
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        assert_eq!(names, ["a.txt", "b.md"]);
    }

    #[test]
    fn add_then_toggle_rewrites_in_place() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let note = tmp.path().join("todo.txt");
        fs::write(&note, "Groceries\n").expect("seed note");

        handle_add(
            AddArgs {
                file: note.clone(),
                text: "Buy milk".to_string(),
                at: None,
                in_place: true,
            },
            false,
        )
        .expect("add");

        let parsed = parse_note(&fs::read_to_string(&note).expect("reread after add"));
        assert_eq!(parsed.tasks.len(), 1);
        assert!(!parsed.tasks[0].completed);

        handle_toggle(
            ToggleArgs {
                file: note.clone(),
                id: parsed.tasks[0].id.to_string(),
                in_place: true,
            },
            false,
        )
        .expect("toggle");

        let parsed = parse_note(&fs::read_to_string(&note).expect("reread after toggle"));
        assert_eq!(parsed.tasks.len(), 1);
        assert!(parsed.tasks[0].completed);
        assert_eq!(parsed.tasks[0].text, "Buy milk");
        assert_eq!(parsed.display_content, "Groceries");
    }

    #[test]
    fn line_numbers_count_from_one() {
        let text = "first\nsecond\nthird";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, text.find("second").unwrap()), 2);
        assert_eq!(line_of(text, text.find("third").unwrap()), 3);
        assert_eq!(line_of(text, 999), 3);
    }
}
