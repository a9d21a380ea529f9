//! A small C project driven by kiln.
//!
//! ```text
//! cargo run --example compile -- -C path/to/project
//! cargo run --example compile -- -C path/to/project test -- --verbose
//! cargo run --example compile -- -C path/to/project compile! cc=clang
//! ```

use std::process::ExitCode;

use kiln::{join, sh, Registry, Spec, TaskDefinition};

fn main() -> ExitCode {
    kiln::main(|params, registry: &mut Registry| {
        let cc = params.get_or("cc", "cc").to_string();
        let flags = params.get_or("cflags", "-O2").to_string();

        registry.register(
            TaskDefinition::new("configure", |ctx| {
                std::fs::write(&ctx.outputs[0], "#define GREETING \"hello\"\n")?;
                Ok(())
            })
            .with_pure(true)
            .with_output("config.h"),
        );

        let compile_flags = flags.clone();
        registry.register(
            TaskDefinition::new("compile", move |ctx| {
                let sources = ctx.inputs.iter().filter(|p| p.extension().is_some_and(|e| e == "c"));
                sh(join(
                    [cc.as_str(), compile_flags.as_str(), "-o", "hello"]
                        .into_iter()
                        .map(str::to_string)
                        .chain(sources.map(|p| p.display().to_string())),
                ))?;
                Ok(())
            })
            .with_dependency("configure")
            .with_input(Spec::sequence([
                Spec::glob("src/*.c"),
                Spec::path("config.h"),
                Spec::value(flags),
            ]))
            .with_output("hello")
            .with_default(true),
        );

        registry.register(
            TaskDefinition::new("test", |ctx| {
                let mut command = vec!["./hello".to_string()];
                command.extend(ctx.args.iter().cloned());
                sh(join(command))?;
                Ok(())
            })
            .with_dependency("compile"),
        );

        registry.register(TaskDefinition::new("clean", |_| {
            sh("rm -f hello config.h")?;
            Ok(())
        }));

        Ok(())
    })
}
