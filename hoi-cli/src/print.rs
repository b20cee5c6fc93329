//! Human-readable rendering of stored project entities.

use hoi_store::Entity;

pub fn status_all(entities: &[Entity]) {
    if entities.is_empty() {
        println!("no projects :(");
        return;
    }
    println!("{} project/s:", entities.len());
    for e in entities {
        status(e);
    }
}

pub fn status(e: &Entity) {
    let p = &e.project;

    println!("● {}", p.pretty_name());
    println!(" {:>8}: **{}**", "Status", e.meta.status);
    println!(" {:>8}: {}", "Path", p.path.display());

    println!(" {:>8}: {}", "Domain", p.domain.len());
    for d in p.domain.values() {
        println!("          - {}", d.fqdn);
        if d.ssl.is_enabled() {
            println!("            - SSL: enabled");
        }
        if d.auth.is_enabled() {
            println!("            - Authentication: enabled");
            println!("              - {:>8}: {}", "User", d.auth.user);
            println!("              - {:>8}: {}", "Password", d.auth.password);
        }
        for r in &d.redirects {
            println!("            - {r} [R]");
        }
        for a in &d.aliases {
            println!("            - {a} [A]");
        }
    }

    println!(" {:>8}: {}", "Cron", p.cron.len());
    for c in p.cron.values() {
        println!("          - {}", c.id());
    }

    println!(" {:>8}: {}", "Worker", p.worker.len());
    for w in p.worker.values() {
        println!("          - {} ({} instance/s)", w.id(), w.instances());
    }

    println!(" {:>8}: {}", "Database", p.database.len());
    for db in p.database.values() {
        println!("          - {}", db.name);
        println!("            - {:>8}: {}", "User", db.user);
        println!("            - {:>8}: {}", "Password", db.password);
    }

    println!(" {:>8}: {}", "Volume", p.volume.len());
    for v in p.volume.values() {
        let kind = if v.is_temporary { "temporary" } else { "persistent" };
        println!("          - {} ({kind})", v.path);
    }
}
