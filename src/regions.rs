// static icao -> gfa region lookup used to pick chart products for a site

// (region, description)
pub const GFA_REGIONS: [(&str, &str); 7] = [
    ("GFACN31", "Pacific (BC)"),
    ("GFACN32", "Prairies (AB/SK/MB)"),
    ("GFACN33", "Ontario-Quebec"),
    ("GFACN34", "Atlantic (NB/NS/PE/NL)"),
    ("GFACN35", "Yukon & NWT"),
    ("GFACN36", "Nunavut"),
    ("GFACN37", "Arctic"),
];

const SITE_REGIONS: &[(&str, &str)] = &[
    // Pacific
    ("CYVR", "GFACN31"),
    ("CYYJ", "GFACN31"),
    ("CYLW", "GFACN31"),
    ("CYXS", "GFACN31"),
    ("CYKA", "GFACN31"),
    ("CYPR", "GFACN31"),
    ("CYXX", "GFACN31"),
    ("CYCD", "GFACN31"),
    ("CYYD", "GFACN31"),
    ("CYXT", "GFACN31"),
    // Prairies
    ("CYYC", "GFACN32"),
    ("CYEG", "GFACN32"),
    ("CYWG", "GFACN32"),
    ("CYXE", "GFACN32"),
    ("CYQR", "GFACN32"),
    ("CYMM", "GFACN32"),
    ("CYQL", "GFACN32"),
    ("CYBR", "GFACN32"),
    ("CYQD", "GFACN32"),
    ("CYTH", "GFACN32"),
    ("CYYQ", "GFACN32"),
    // Ontario-Quebec
    ("CYYZ", "GFACN33"),
    ("CYOW", "GFACN33"),
    ("CYUL", "GFACN33"),
    ("CYQB", "GFACN33"),
    ("CYTZ", "GFACN33"),
    ("CYHM", "GFACN33"),
    ("CYXU", "GFACN33"),
    ("CYQT", "GFACN33"),
    ("CYSB", "GFACN33"),
    ("CYTS", "GFACN33"),
    ("CYVO", "GFACN33"),
    ("CYBG", "GFACN33"),
    ("CYUY", "GFACN33"),
    ("CYZV", "GFACN33"),
    ("CYMX", "GFACN33"),
    // Atlantic
    ("CYYT", "GFACN34"),
    ("CYHZ", "GFACN34"),
    ("CYQX", "GFACN34"),
    ("CYDF", "GFACN34"),
    ("CYJT", "GFACN34"),
    ("CYQM", "GFACN34"),
    ("CYFC", "GFACN34"),
    ("CYSJ", "GFACN34"),
    ("CYYG", "GFACN34"),
    ("CYQY", "GFACN34"),
    ("CYYR", "GFACN34"),
    ("CYAY", "GFACN34"),
    ("CYQI", "GFACN34"),
    ("CYCX", "GFACN34"),
    // Yukon & NWT
    ("CYXY", "GFACN35"),
    ("CYZF", "GFACN35"),
    ("CYEV", "GFACN35"),
    ("CYDA", "GFACN35"),
    ("CYVQ", "GFACN35"),
    ("CYHY", "GFACN35"),
    ("CYSM", "GFACN35"),
    // Nunavut
    ("CYFB", "GFACN36"),
    ("CYRT", "GFACN36"),
    ("CYBK", "GFACN36"),
    ("CYCB", "GFACN36"),
    ("CYZS", "GFACN36"),
    ("CYEK", "GFACN36"),
    // Arctic
    ("CYRB", "GFACN37"),
    ("CYLT", "GFACN37"),
    ("CYIO", "GFACN37"),
    ("CYUX", "GFACN37"),
];

// looks up the forecast region for a site, case-insensitive
pub fn gfa_region_for(site: &str) -> Option<&'static str> {
    let site = site.trim();
    SITE_REGIONS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(site))
        .map(|(_, region)| *region)
}

pub fn region_name(region: &str) -> Option<&'static str> {
    GFA_REGIONS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(region))
        .map(|(_, name)| *name)
}
