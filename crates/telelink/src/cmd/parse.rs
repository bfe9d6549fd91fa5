use telelink_transport::Descriptor;

use crate::cmd::ParseArgs;
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_descriptor, OutputFormat};

pub fn run(args: ParseArgs, format: OutputFormat) -> CliResult<i32> {
    let descriptor =
        Descriptor::parse(&args.url).map_err(|err| link_error("invalid descriptor", &err))?;
    print_descriptor(&descriptor, format);
    Ok(SUCCESS)
}
