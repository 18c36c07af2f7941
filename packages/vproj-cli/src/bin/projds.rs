use vproj_cli::cli::ProjectArgs;
use vproj_cli::{commands, init_logging, parse_args};

fn main() {
    let args: ProjectArgs = parse_args();
    init_logging(args.verbose);
    std::process::exit(commands::project::execute(args));
}
