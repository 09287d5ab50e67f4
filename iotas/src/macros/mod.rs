mod cfg;

pub(crate) use cfg::{
    cfg, cfg_doc, cfg_frame, cfg_loom, cfg_not, cfg_not_frame, cfg_not_loom,
};
