use std::sync::Arc;

use featureflags::{
    AssignmentEvent, ExperimentDefinition, FlagDefinition, FlagValue, JsonFileStore,
    ResolverConfig, UserContext, Variant,
};

pub fn main() -> featureflags::Result<()> {
    // Configure env_logger to see featureflags logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("featureflags=debug"))
        .init();

    // Assignments persist in this file, so users keep their variant across runs.
    let path = std::env::var("FEATUREFLAGS_STORE")
        .unwrap_or_else(|_| "featureflags-demo.json".to_owned());
    let resolver = ResolverConfig::new(Arc::new(JsonFileStore::open(path)?))
        .with_assignment_logger(|event: AssignmentEvent| {
            println!("Logging assignment event: {:?}", event);
        })
        .to_resolver()?;

    resolver.register_flags([
        FlagDefinition::new("new_checkout", false).with_rollout_percentage(50),
        FlagDefinition::new("producer_dashboard", false).with_target_roles(["producer"]),
    ])?;
    resolver.register_experiment(
        ExperimentDefinition::new(
            "layout",
            vec![Variant::new("A", 50, "grid"), Variant::new("B", 50, "list")],
        )
        .with_default_variant("A"),
    )?;

    for user in [
        UserContext::for_user("user-1").with_role("producer"),
        UserContext::for_user("user-2").with_role("buyer"),
        UserContext::anonymous(),
    ] {
        println!(
            "{:?}: new_checkout={} producer_dashboard={} layout={:?}",
            user.user_id,
            resolver.is_enabled("new_checkout", &user),
            resolver.is_enabled("producer_dashboard", &user),
            resolver.evaluate("layout", &user),
        );
    }

    // An operator turns the new checkout on for everybody.
    if let Err(err) =
        resolver.sync_overrides([("new_checkout".to_owned(), FlagValue::from(true))].into())
    {
        println!("error persisting overrides: {:?}", err);
    }
    println!(
        "after override: {:?}",
        resolver.evaluate_details("new_checkout", &UserContext::for_user("user-2"))
    );

    resolver.shutdown()
}
