use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::process::exit;
use std::rc::Rc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use interpreter::{Interpreter, RunError};
use log::debug;

use crate::args::RefloxArgs;

mod args;

const EXIT_USAGE: i32 = 64;
const EXIT_NO_INPUT: i32 = 65;
const EXIT_STATIC_ERROR: i32 = 70;
const EXIT_RUNTIME_ERROR: i32 = 75;

fn main() {
    env_logger::init();

    let args = match RefloxArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit(0),
                _ => exit(EXIT_USAGE),
            }
        }
    };

    let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(io::stdout()));
    let mut interpreter = Interpreter::new(stdout).with_args(args.args);

    let code = match args.script {
        Some(path) => run_file(&mut interpreter, &path),
        None => run_prompt(&mut interpreter),
    };
    exit(code)
}

fn run_file(interpreter: &mut Interpreter, path: &str) -> i32 {
    let src = match fs::read_to_string(path).with_context(|| format!("Could not read '{}'", path)) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("{err:#}");
            return EXIT_NO_INPUT;
        }
    };

    debug!("running script '{}'", path);
    match interpreter.run(&src) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", err);
            match err {
                RunError::Static(_) => EXIT_STATIC_ERROR,
                RunError::Runtime(_) => EXIT_RUNTIME_ERROR,
            }
        }
    }
}

fn run_prompt(interpreter: &mut Interpreter) -> i32 {
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return 0;
        }

        // The lock on stdin is not held between lines, `input()` reads from it too.
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => return 0,
            Ok(_) => {}
        }
        // Each line is a complete source, the newline terminates its last statement.
        if !line.ends_with('\n') {
            line.push('\n');
        }

        if let Err(err) = interpreter.run(&line) {
            eprintln!("{}", err);
        }
    }
}
