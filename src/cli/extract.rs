use super::utils::{read_file, write_output};
use super::{ExtractArgs, OutputFormat};
use crate::decompiler::{Decompiler, MethodReport};
use crate::error::Result as DecompilerResult;
use crate::ir::RawMethod;

/// Run the extract subcommand
pub fn extract(args: &ExtractArgs) -> DecompilerResult<()> {
    let text = read_file(&args.input_path)?;
    let methods = RawMethod::list_from_json(&text)?;
    log::info!(
        "Loaded {} method(s) from {}",
        methods.len(),
        args.input_path.display()
    );

    let decompiler = Decompiler::new(args.to_options());
    let reports = decompiler
        .decompile_all(methods)
        .into_iter()
        .collect::<DecompilerResult<Vec<MethodReport>>>()?;

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&reports)?,
        OutputFormat::Text => reports
            .iter()
            .map(MethodReport::to_text)
            .collect::<Vec<_>>()
            .join("\n"),
    };
    write_output(&output, args.output_path.as_deref())
}
