use crate::cli::Commands;
use indicatif::{ProgressBar, ProgressStyle};
use memql::config::{load_config, EngineConfig};
use memql::engine::split_statements;
use memql::{Engine, Session, StatementOutput, Value};
use std::io::{BufRead, Write};
use std::sync::Arc;

pub fn handle_command(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Repl { config, verbose } => {
            let config = load_config(config)?;
            let (_engine, session) = open_engine(&config)?;
            if verbose {
                println!("Engine ready ({} init file(s) loaded)", config.init_files().len());
            }
            repl(&session)
        }

        Commands::Run {
            file,
            config,
            halt_on_error,
            schema,
            verbose,
        } => {
            let config = load_config(config)?;
            let (engine, session) = open_engine(&config)?;

            let script = std::fs::read_to_string(&file)
                .map_err(|e| format!("Failed to read script {file:?}: {e}"))?;
            let statements = split_statements(&script)?;
            println!("Running {:?} ({} statements)", file, statements.len());

            // style for progress bar
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} statements ({msg})",
            )?
            .progress_chars("#>-");
            let pb = ProgressBar::new(statements.len() as u64);
            pb.set_style(style);

            let mut failed = 0usize;
            for statement in &statements {
                match session.execute(statement) {
                    Ok(output) => {
                        if verbose {
                            pb.suspend(|| print_output(&output));
                        }
                    }
                    Err(err) => {
                        failed += 1;
                        pb.suspend(|| eprintln!("Error: {err}\n  while executing: {statement}"));
                        if halt_on_error {
                            pb.abandon_with_message("stopped on error");
                            return Err(err.into());
                        }
                    }
                }
                pb.inc(1);
            }
            pb.finish_with_message(format!("done, {failed} failed"));

            if let Some(path) = schema {
                let file = std::fs::File::create(&path)?;
                serde_json::to_writer_pretty(file, &engine.schema_snapshot())?;
                println!("💾 Schema snapshot saved to: {path:?}");
            }
            Ok(())
        }

        Commands::Exec { sql, config } => {
            let config = load_config(config)?;
            let (_engine, session) = open_engine(&config)?;
            for result in session.execute_batch(&sql)? {
                match result {
                    Ok(output) => print_output(&output),
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
            Ok(())
        }
    }
}

fn open_engine(
    config: &EngineConfig,
) -> Result<(Arc<Engine>, Session), Box<dyn std::error::Error>> {
    let engine = Arc::new(Engine::new());
    let session = engine.session();
    if config.recording() {
        session.start_recording();
    }
    if !config.autocommit() {
        session.execute("SET AUTOCOMMIT = 0")?;
    }
    for path in config.init_files() {
        let file = std::fs::File::open(&path)
            .map_err(|e| format!("Failed to open init file {path:?}: {e}"))?;
        for result in session.import(std::io::BufReader::new(file))? {
            result?;
        }
    }
    Ok((engine, session))
}

fn repl(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    println!("memql interactive shell. End statements with ';', 'exit' to quit");
    let stdin = std::io::stdin();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.trim().is_empty() {
            "memql> "
        } else {
            "    -> "
        };
        print!("{prompt}");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let trimmed = line.trim();
        if buffer.trim().is_empty() && matches!(trimmed, "exit" | "quit" | "\\q") {
            return Ok(());
        }
        buffer.push_str(&line);
        if !trimmed.ends_with(';') {
            continue;
        }

        match session.execute_batch(&buffer) {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(output) => print_output(&output),
                        Err(err) => eprintln!("Error: {err}"),
                    }
                }
            }
            Err(err) => eprintln!("Error: {err}"),
        }
        buffer.clear();
    }
}

fn print_output(output: &StatementOutput) {
    match output {
        StatementOutput::Rows(rows) => print_row_set(&rows.columns, &rows.rows),
        StatementOutput::Affected(n) => println!("Query OK, {n} row(s) affected"),
        StatementOutput::Status(s) => println!("{s}"),
    }
}

// plain aligned output, enough for a shell
fn print_row_set(columns: &[String], rows: &[Vec<Value>]) {
    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(render_value).collect())
        .collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let line = |left: char, mid: char, right: char| {
        let mut s = String::new();
        s.push(left);
        for (i, w) in widths.iter().enumerate() {
            s.push_str(&"-".repeat(w + 2));
            s.push(if i + 1 == widths.len() { right } else { mid });
        }
        s
    };

    println!("{}", line('+', '+', '+'));
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!(" {c:<width$} ", width = widths[i]))
        .collect();
    println!("|{}|", header.join("|"));
    println!("{}", line('+', '+', '+'));
    for row in &rendered {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, c)| format!(" {c:<width$} ", width = widths[i]))
            .collect();
        println!("|{}|", cells.join("|"));
    }
    println!("{}", line('+', '+', '+'));
    println!("{} row(s) in set", rows.len());
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_text(),
    }
}
