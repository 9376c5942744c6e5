use super::print_json;
use crate::cli::args::{RegistryAction, RegistryArgs, RegistryKind};
use crate::exit_codes::SUCCESS;
use pi_core::{DataLayer, RouteSelector};

pub fn run(layer: &DataLayer, args: RegistryArgs) -> anyhow::Result<i32> {
    match args.kind {
        RegistryKind::Role => {
            let section = args.section.unwrap_or_default();
            let registry = &layer.roles;
            match args.action {
                RegistryAction::Read => print_json(&registry.read(&section)?)?,
                RegistryAction::Create => print_json(&registry.create(&section)?)?,
                RegistryAction::Clear => registry.clear(&section)?,
                RegistryAction::Flush => println!("{}", registry.flush()?),
            }
        }
        RegistryKind::Route => {
            let selector = route_selector(args.section, args.exclude);
            let registry = &layer.routes;
            match args.action {
                RegistryAction::Read => print_json(&registry.read(&selector)?)?,
                RegistryAction::Create => print_json(&registry.create(&selector)?)?,
                RegistryAction::Clear => registry.clear(&registry.namespace(&selector))?,
                RegistryAction::Flush => println!("{}", registry.flush()?),
            }
        }
    }
    Ok(SUCCESS)
}

fn route_selector(section: Option<String>, exclude: bool) -> RouteSelector {
    let selector = section.map_or_else(RouteSelector::default, RouteSelector::section);
    RouteSelector { exclude, ..selector }
}
