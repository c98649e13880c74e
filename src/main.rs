#![deny(unused_must_use)]
#![warn(clippy::pedantic)]

use std::fs;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use ionc::codegen::CodeGen;
use ionc::lexer::{self, Token, TokenData};

#[derive(Parser, Debug)]
#[command(
    name = "ion",
    version,
    about = "Compiler for the Ion language, emitting x86-64 FASM for Windows PE64"
)]
struct Args {
    /// Ion source files to compile
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Stop after lexing and dump the token stream
    #[arg(long)]
    lex: bool,

    /// Stop after parsing and dump the AST and the symbol table
    #[arg(long)]
    parse: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    for input in &args.inputs {
        if !input.ends_with(".ion") {
            eprintln!("ERR: File format not recognized");
            process::exit(1);
        }

        let Ok(mut source) = fs::read_to_string(input) else {
            eprintln!("ERR: File not found");
            process::exit(1);
        };
        // the line-oriented grammar wants a terminated last statement
        if !source.ends_with('\n') {
            source.push('\n');
        }

        if args.lex {
            dbg!(lex_all(&source));
            continue;
        }

        let parsed = match ionc::parser::parse(&source) {
            Ok(parsed) => parsed,
            Err(err) => {
                println!("{err}");
                process::exit(1);
            }
        };

        if args.parse {
            dbg!(&parsed);
            continue;
        }

        let asm = match CodeGen::generate(&parsed.program, parsed.table, parsed.strings) {
            Ok(asm) => asm,
            Err(err) => {
                println!("{err}");
                process::exit(1);
            }
        };

        // the output lands next to the input, .ion swapped for .asm
        let base = &input[..input.len() - 4];
        let output = format!("{base}.asm");
        fs::write(&output, asm).with_context(|| format!("failed to write {output}"))?;
    }

    Ok(())
}

fn lex_all(source: &str) -> Vec<TokenData> {
    let mut tokens = Vec::new();
    let mut index = 0;
    loop {
        let (token, next) = lexer::next_token(source, index);
        index = next;
        let done = token.token == Token::EndOfFile;
        tokens.push(token);
        if done {
            break;
        }
    }
    tokens
}
