//! Shared test fixture: a miniature on-disk client package.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Lays out a declaration tree shaped like the real client package: an
/// index re-exporting the `Client` class plus two same-named schema
/// namespaces (simple and raw). Returns the directory guard and the entry
/// file path.
pub(crate) fn fixture_package() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::write(
        root.join("index.d.ts"),
        "export { Client } from './client.js';\nexport * as ApiTypes from './SimpleSchemaTypes.js';\nexport * as RawApiTypes from './SchemaTypes.js';\n",
    )
    .unwrap();

    fs::write(
        root.join("client.d.ts"),
        r"
import * as SimpleSchemaTypes from './SimpleSchemaTypes.js';
import * as SchemaTypes from './SchemaTypes.js';
import { BaseResource } from './BaseResource.js';

export declare class Items extends BaseResource {
    /** Lists all records.
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/instances
     */
    list(queryParams?: SimpleSchemaTypes.ItemInstancesHrefSchema): Promise<SimpleSchemaTypes.ItemInstancesTargetSchema>;
    /** Lists all records (raw envelope).
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/instances
     */
    rawList(queryParams?: SchemaTypes.ItemInstancesHrefSchema): Promise<SchemaTypes.ItemInstancesTargetSchema>;
}

export declare class ItemTypes extends BaseResource {
    /** Lists all models.
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item-type/instances
     */
    list(): Promise<SimpleSchemaTypes.ItemTypeInstancesTargetSchema>;
    /** Lists all models (raw envelope).
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item-type/instances
     */
    rawList(): Promise<SchemaTypes.ItemTypeInstancesTargetSchema>;
}

export declare class Client {
    items: Items;
    itemTypes: ItemTypes;
    config: ClientConfig;
}

export type ClientConfig = {
    apiToken: string | null;
    environment?: string;
    baseUrl?: string;
};
",
    )
    .unwrap();

    fs::write(
        root.join("BaseResource.d.ts"),
        "export declare class BaseResource {\n    rawFetch(body: unknown): Promise<unknown>;\n}\n",
    )
    .unwrap();

    fs::write(
        root.join("SimpleSchemaTypes.d.ts"),
        r"
export type ItemTypeInstancesTargetSchema = ItemType[];
export type ItemInstancesTargetSchema = Item[];
export type ItemInstancesHrefSchema = {
    filter?: { type?: string };
    page?: { offset?: number; limit?: number };
};
export type Item = {
    id: string;
    item_type: ItemTypeData;
};
export type ItemTypeData = { id: string; type: 'item_type' };
export type ItemType = {
    id: string;
    api_key: string;
};
",
    )
    .unwrap();

    fs::write(
        root.join("SchemaTypes.d.ts"),
        r"
export type ItemTypeInstancesTargetSchema = {
    data: ItemType[];
};
export type ItemInstancesTargetSchema = {
    data: Item[];
    meta: { total_count: number };
};
export type ItemInstancesHrefSchema = {
    'filter[type]'?: string;
};
export type Item = {
    id: string;
    type: 'item';
    attributes: { [k: string]: unknown };
};
export type ItemType = {
    id: string;
    type: 'item_type';
    attributes: { api_key: string };
};
",
    )
    .unwrap();

    let entry = root.join("index.d.ts");
    (dir, entry)
}
