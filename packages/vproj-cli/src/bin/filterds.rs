use vproj_cli::cli::FilterArgs;
use vproj_cli::{commands, init_logging, parse_args};

fn main() {
    let args: FilterArgs = parse_args();
    init_logging(args.verbose);
    std::process::exit(commands::filter::execute(args));
}
